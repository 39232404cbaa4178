#![allow(clippy::cast_possible_truncation)]

mod options;

use anyhow::Error as AnyError;
use clap::Parser;
use log::info;
use options::{Cli, Command as CliCmd, SourceArgs};
use serde::Serialize;
use std::{fs::File, io::BufReader, path::Path};
use terrain::{
    align::load_survey,
    pointcloud::{load_catalog, scan_catalog},
    rank_similar, Config, ElevationSources, PointCloudCache, PointCloudSampler, RasterTileIndex,
    SourceName, SourcesReport, Trail, TrailSummary,
};
use textplots::{Chart, Plot, Shape};

fn main() -> Result<(), AnyError> {
    let Cli { config, cmd } = Cli::parse();

    env_logger::init();

    let config = match config {
        Some(path) => Config::from_path(path)?,
        None => Config::default(),
    };

    match cmd {
        CliCmd::Sources(args) => print_json(&sources(&args, &config)?)?,
        CliCmd::Plot(args) => plot_ascii(&sources(&args, &config)?),
        CliCmd::Metrics { trail } => {
            let trail = Trail::from_path(trail)?;
            print_json(&TrailSummary::analyze(&trail)?)?;
        }
        CliCmd::Similar {
            trail,
            candidates,
            limit,
        } => {
            let target = TrailSummary::analyze(&Trail::from_path(trail)?)?;
            let candidates = load_trails(&candidates)?
                .iter()
                .map(TrailSummary::analyze)
                .collect::<Result<Vec<_>, _>>()?;
            print_json(&rank_similar(&target, &candidates, limit))?;
        }
    };
    Ok(())
}

fn sources(args: &SourceArgs, config: &Config) -> Result<SourcesReport, AnyError> {
    let trail = Trail::from_path(&args.trail)?;

    let raster = args
        .tile_dir
        .as_ref()
        .map(|dir| RasterTileIndex::scan(dir, config.tile_mode))
        .transpose()?;

    let mut catalog = Vec::new();
    if let Some(path) = &args.catalog {
        let records = load_catalog(path)?;
        info!("{} point-cloud records in {}", records.len(), path.display());
        catalog.extend(records);
    }
    if let Some(dir) = &args.lidar_dir {
        let records = scan_catalog(dir)?;
        info!("{} point-cloud files in {}", records.len(), dir.display());
        catalog.extend(records);
    }
    let point_clouds = if catalog.is_empty() {
        None
    } else {
        Some(PointCloudSampler::new(
            catalog,
            PointCloudCache::from_config(config)?,
        ))
    };

    let survey = args.survey.as_ref().map(load_survey).transpose()?;

    let mut builder = ElevationSources::builder().trail(&trail).config(config);
    if let Some(index) = &raster {
        builder = builder.raster(index);
    }
    if let Some(sampler) = &point_clouds {
        builder = builder.point_clouds(sampler);
    }
    if let Some(rows) = &survey {
        builder = builder.survey(rows);
    }
    Ok(builder.build()?)
}

fn load_trails(path: &Path) -> Result<Vec<Trail>, AnyError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AnyError> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

/// One chart per available source, elevation against distance.
fn plot_ascii(report: &SourcesReport) {
    for name in SourceName::ALL {
        let Some(source) = report.source(name).filter(|source| source.available) else {
            continue;
        };
        let plot_data: Vec<(f32, f32)> = source
            .distances_km
            .iter()
            .zip(source.elevations.iter())
            .map(|(distance, elevation)| (*distance as f32, *elevation as f32))
            .collect();
        let end = plot_data.last().map_or(1.0, |(distance, _)| distance.max(1e-3));
        println!("{name} (km, m)");
        Chart::new(180, 60, 0.0, end)
            .lineplot(&Shape::Lines(&plot_data))
            .display();
    }
}
