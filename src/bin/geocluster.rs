use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use chrono::Local;
use clap::{ArgAction, Parser};
use env_logger::Builder;
use geo_types::{coord, Point};
use log::{debug, info, LevelFilter};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use geocluster::{
    proj,
    source::shared,
    ClusterSource,
    Feature,
    FeatureId,
    FeatureSource,
    GeoClusterConfig,
    Geometry,
    Projection,
    VectorSource,
};

/// Cluster point features for a map viewport and print the result as GeoJSON
#[derive(Parser, Debug)]
#[command(name = "geocluster", version)]
struct Args {
    /// JSON array of {"lon", "lat", "properties"} points, or a GeoJSON FeatureCollection
    input: PathBuf,

    /// INI file with [cluster], [engine] and [view] sections
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the clustering radius in pixels
    #[arg(long)]
    radius: Option<f64>,

    /// Override the view zoom
    #[arg(long)]
    zoom: Option<f64>,

    /// Pass singletons through and resolve members lazily
    #[arg(long)]
    on_demand: bool,

    /// Add member ids and expansion zoom to every cluster
    #[arg(long)]
    expand: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Input {
    Collection { features: Vec<InputFeature> },
    Points(Vec<InputPoint>),
}

#[derive(Debug, Deserialize)]
struct InputPoint {
    lon: f64,
    lat: f64,
    #[serde(default)]
    id: Option<FeatureId>,
    #[serde(default)]
    properties: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct InputFeature {
    #[serde(default)]
    id: Option<FeatureId>,
    geometry: Option<Geometry>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

fn init_logging(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let log_level = match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = Builder::new();
    builder
        .filter(None, log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        });

    if let Some(path) = &args.log_file {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let log_file = File::create(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }

    builder.init();
    Ok(())
}

/// Reads input features, reprojecting them from longitude/latitude into `projection`.
fn read_input(path: &Path, projection: Projection) -> geocluster::Result<Vec<Feature>> {
    let content = fs::read_to_string(path)?;
    let input: Input = serde_json::from_str(&content)?;

    let features = match input {
        Input::Points(points) => points.into_iter()
            .map(|p| Feature {
                id: p.id,
                geometry: Some(Geometry::Point(Point::from(
                    proj::from_lon_lat(coord! { x: p.lon, y: p.lat }, projection)
                ))),
                properties: p.properties,
                cluster: None,
            })
            .collect(),
        Input::Collection { features } => features.into_iter()
            .map(|f| Feature {
                id: f.id,
                geometry: f.geometry.map(|g| g.map_coordinates(|c| proj::from_lon_lat(c, projection))),
                properties: f.properties.unwrap_or_default(),
                cluster: None,
            })
            .collect(),
    };
    Ok(features)
}

fn to_geojson(
    clusters: &ClusterSource<VectorSource, geocluster::MapView>,
    projection: Projection,
    expand: bool,
) -> geocluster::Result<Value> {
    let mut output = Vec::new();

    for feature in clusters.features() {
        let geometry = feature.geometry.as_ref()
            .map(|g| g.map_coordinates(|c| proj::to_lon_lat(c, projection)));
        let mut properties = feature.properties.clone();

        if expand && feature.is_cluster() {
            let members: Vec<Value> = clusters.get_features_for_cluster(&feature)?
                .iter()
                .map(|m| m.id.as_ref().map_or(Value::Null, |id| json!(id)))
                .collect();
            properties.insert("members".to_string(), Value::from(members));
            properties.insert(
                "expansion_zoom".to_string(),
                json!(clusters.get_cluster_expansion_zoom(&feature)?),
            );
        }

        let mut entry = json!({
            "type": "Feature",
            "geometry": geometry,
            "properties": properties,
        });
        if let Some(id) = &feature.id {
            entry["id"] = json!(id);
        }
        output.push(entry);
    }

    Ok(json!({
        "type": "FeatureCollection",
        "features": output,
    }))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(&args)?;

    let mut config = match &args.config {
        Some(path) => GeoClusterConfig::from_ini(path)?,
        None => GeoClusterConfig::default(),
    };
    if let Some(radius) = args.radius {
        config.cluster.radius = radius;
    }
    if let Some(zoom) = args.zoom {
        config.view.zoom = zoom;
    }
    if args.on_demand {
        config.cluster.on_demand = true;
    }
    config.validate()?;
    debug!("Effective configuration: {:?}", config);

    let view = Rc::new(config.view.build_view()?);
    let projection = view.projection();

    let features = read_input(&args.input, projection)?;
    info!("Read {} features from {:?}", features.len(), args.input);

    let source = shared(VectorSource::with_features(features));
    let clusters = ClusterSource::new(
        config.cluster_source_options(Rc::clone(&source), Rc::clone(&view))
    )?;

    let extent = config.view.viewport_extent(&view);
    clusters.load_features(&extent, view.resolution(), projection)?;
    info!(
        "{} output features at zoom {:.2} for extent {:?}",
        clusters.features().len(), config.view.zoom, geocluster::types::bbox(&extent)
    );

    let output = to_geojson(&clusters, projection, args.expand)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
