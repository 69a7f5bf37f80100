use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use mathmap::field::png::{render_preview, save_preview};
use mathmap::{GridExportLevel, MapError, MapGenerationParams, OsmWriter, generate_map, load_catalog};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Генератор карты классификации в формате OSM
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Путь к конфигурационному файлу в формате TOML (по умолчанию — встроенные параметры)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// `PlotData.txt` верхнего уровня; каталоги детей `MSC*` ищутся рядом с ним
    #[arg(short, long)]
    plot_data: PathBuf,

    /// Файл описаний классов (`number***description`)
    #[arg(short, long)]
    descriptions: PathBuf,

    /// Путь для сохранения карты (по умолчанию: ./map.osm)
    #[arg(short, long, default_value = "map.osm")]
    output: PathBuf,

    /// Сводка прогона в JSON
    #[arg(long)]
    summary: Option<PathBuf>,

    /// PNG-превью сетки
    #[arg(long)]
    preview: Option<PathBuf>,

    /// CSV-выгрузка сетки для сервиса поиска
    #[arg(long)]
    grid_csv: Option<PathBuf>,

    /// Уровень кодов в CSV-выгрузке
    #[arg(long, value_enum, default_value_t = GridLevel::Top)]
    grid_level: GridLevel,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum GridLevel {
    Top,
    Grid,
}

impl From<GridLevel> for GridExportLevel {
    fn from(level: GridLevel) -> Self {
        match level {
            GridLevel::Top => GridExportLevel::Top,
            GridLevel::Grid => GridExportLevel::Grid,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    info!("🔍 Загрузка конфигурации...");
    let params = match &cli.config {
        Some(path) => MapGenerationParams::from_toml_file(path)?,
        None => MapGenerationParams::default(),
    };

    let catalog = load_catalog(
        &cli.plot_data,
        &cli.descriptions,
        params.resolution,
        params.top_level_share,
    )?;

    let file = File::create(&cli.output).map_err(|e| MapError::io(&cli.output, e))?;
    let mut writer = OsmWriter::new(BufWriter::new(file), params.resolution)?;
    let map = generate_map(&catalog, &params, &mut writer)?;
    info!("💾 Карта сохранена в {}", cli.output.display());

    if let Some(path) = &cli.summary {
        let file = File::create(path).map_err(|e| MapError::io(path, e))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &map.summary)?;
        info!("📝 Сводка сохранена в {}", path.display());
    }

    if let Some(path) = &cli.grid_csv {
        let file = File::create(path).map_err(|e| MapError::io(path, e))?;
        map.grid
            .write_csv(&catalog, cli.grid_level.into(), BufWriter::new(file))?;
        info!("📊 Сетка выгружена в {}", path.display());
    }

    if let Some(path) = &cli.preview {
        let img = render_preview(&map.grid, &map.labels, &catalog, &map.coloring, params.palette_seed);
        save_preview(&img, path)?;
        info!("🖼️ Превью сохранено в {}", path.display());
    }

    println!("\nГотово! Карта сгенерирована.");
    Ok(())
}
