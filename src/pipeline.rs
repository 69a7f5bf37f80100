// src/pipeline.rs
//! Полный прогон генерации карты
//!
//! Стадии выполняются строго по порядку: поле влияния → разметка воды →
//! границы (с регистрацией узлов сетки) → именованные узлы → рамка океана →
//! раскраска → береговая линия → границы регионов → `finalize`.
//!
//! Все сетки и множества точек живут только внутри одного вызова
//! [`generate_map`]; наружу отдаются сводка и данные для превью/CSV.

use serde::Serialize;
use tracing::{debug, info};

use crate::boundary::extract_boundaries;
use crate::coloring::{RegionColoring, build_adjacency_graph, color_graph, subject_family};
use crate::config::MapGenerationParams;
use crate::error::MapError;
use crate::field::{FieldStats, OwnershipGrid, build_influence_field};
use crate::labels::{LabelGrid, label_water};
use crate::osm::{GeometryWriter, NodeRef};
use crate::polygon::{Polygon, PolygonAssembler, PolygonKind, split_ways};
use crate::source::{Level, SourceCatalog, SourceId};

/// Углы рамки, которая «раздвигает» океан за пределы карты при рендеринге
const FRAME_CORNERS: [(f64, f64); 4] = [(-5.0, -5.0), (5.0, -5.0), (5.0, 5.0), (-5.0, 5.0)];
/// Смещения вершин крошечного острова в каждом углу
const FRAME_OFFSETS: [(f64, f64); 4] = [(1.0, 0.0), (0.0, 1.0), (-1.0, 0.0), (0.0, -1.0)];
const FRAME_EPS: f64 = 1e-7;

/// Сводка одного прогона, сериализуется в JSON
#[derive(Debug, Clone, Serialize)]
pub struct MapSummary {
    pub resolution: usize,
    pub grid_level: Level,
    pub field: FieldStats,
    pub regions: Vec<RegionSummary>,
    pub coast_rings: usize,
    pub lake_rings: usize,
    pub lakes: Vec<LakeSummary>,
    /// Всего записанных путей, включая рамку
    pub ways: usize,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegionSummary {
    pub code: String,
    pub level: Level,
    /// Клетки самого источника и всех его потомков
    pub cells: usize,
    pub polygons: usize,
    pub color: Option<u32>,
    pub family: Option<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LakeSummary {
    /// Регион на суше у первой точки озера
    pub owner: Option<String>,
    pub nodes: usize,
}

/// Аномалии, которые не обрывают прогон
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Diagnostics {
    pub orphan_crossings: usize,
    pub forced_closures: usize,
    pub skipped_sources: usize,
}

/// Результат прогона: сводка и растры для превью и выгрузки
#[derive(Debug, Clone)]
pub struct GeneratedMap {
    pub summary: MapSummary,
    pub grid: OwnershipGrid,
    pub labels: LabelGrid,
    pub coloring: RegionColoring,
}

/// Генерирует карту из каталога и пишет геометрию в `writer`
pub fn generate_map<W: GeometryWriter>(
    catalog: &SourceCatalog,
    params: &MapGenerationParams,
    writer: &mut W,
) -> Result<GeneratedMap, MapError> {
    params.validate()?;
    let r = params.resolution;

    let grid_level = catalog.grid_level();
    let sources = catalog.level(grid_level);
    if sources.is_empty() {
        return Err(MapError::InvalidConfig(
            "catalog has no top-level sources".to_string(),
        ));
    }
    info!(
        "🚀 Генерация карты {r}×{r}: {} источников уровня {grid_level:?}",
        sources.len()
    );

    let field = build_influence_field(catalog, &sources, r, params.weight_constant)?;
    let labels = label_water(&field.grid, params.labeling)?;
    let mut boundaries = extract_boundaries(&field.grid, catalog, writer)?;

    write_named_nodes(catalog, r, writer)?;

    let mut ways = 0;
    if params.expand_ocean {
        ways += write_ocean_frame(writer)?;
    }

    let coloring = color_graph(&build_adjacency_graph(&field.grid, catalog));

    let mut diagnostics = Diagnostics {
        orphan_crossings: boundaries.orphan_crossings,
        forced_closures: 0,
        skipped_sources: field.stats.skipped_sources,
    };

    // Береговая линия
    let coast = PolygonAssembler::new(params.assembly.coast_search, &params.assembly).coastline(
        &mut boundaries.coastline,
        &labels,
        &boundaries.coast_owner,
    );
    diagnostics.forced_closures += coast.forced_closures;

    let mut coast_counter = 0;
    let mut lakes = Vec::new();
    for polygon in &coast.polygons {
        ways += write_coast(polygon, params.max_way_nodes, &mut coast_counter, writer)?;
        if polygon.kind == PolygonKind::Lake {
            lakes.push(LakeSummary {
                owner: polygon.owner.map(|id| catalog.get(id).code.clone()),
                nodes: polygon.points.len(),
            });
        }
    }
    let lake_rings = lakes.len();
    let coast_rings = coast.polygons.len() - lake_rings;
    info!("🏝️ Береговая линия: {coast_rings} колец берега, {lake_rings} озёр");

    // Границы регионов в порядке регистрации
    let border_assembler = PolygonAssembler::new(params.assembly.border_search, &params.assembly);
    let cells = region_cells(&field.grid, catalog);
    let mut regions = Vec::new();
    for (id, source) in catalog.iter() {
        let Some(mut points) = boundaries.regions.remove(&id) else {
            continue;
        };
        let assembly = border_assembler.region(&mut points, id, source.level);
        diagnostics.forced_closures += assembly.forced_closures;

        let color = coloring.color_of(id).filter(|_| source.level == Level::Top);
        let family = if source.level == Level::Top {
            subject_family(&source.code)
        } else {
            None
        };
        let style = BorderStyle {
            code: &source.code,
            level: source.level,
            color,
            family,
        };
        let mut counter = 0;
        for polygon in &assembly.polygons {
            ways += write_border(&style, polygon, params.max_way_nodes, &mut counter, writer)?;
        }

        regions.push(RegionSummary {
            code: source.code.clone(),
            level: source.level,
            cells: cells[id.index()],
            polygons: assembly.polygons.len(),
            color,
            family,
        });
    }
    info!("🧭 Границы: {} регионов", regions.len());

    writer.finalize()?;
    debug!(?diagnostics, "Диагностика прогона");
    info!("✅ Карта записана: {ways} путей");

    let summary = MapSummary {
        resolution: r,
        grid_level,
        field: field.stats,
        regions,
        coast_rings,
        lake_rings,
        lakes,
        ways,
        diagnostics,
    };
    Ok(GeneratedMap {
        summary,
        grid: field.grid,
        labels,
        coloring,
    })
}

/// Столицы: узел в позиции каждого источника верхнего и среднего уровня
fn write_named_nodes<W: GeometryWriter>(
    catalog: &SourceCatalog,
    resolution: usize,
    writer: &mut W,
) -> Result<(), MapError> {
    let r = resolution as f64;
    for (level, marker) in [(Level::Top, "0"), (Level::Mid, "1")] {
        for id in catalog.level(level) {
            let source = catalog.get(id);
            writer.register_named_node(
                &source.code,
                source.x / r,
                source.y / r,
                &[
                    ("name", source.code.as_str()),
                    ("description", source.description.as_str()),
                    ("MSCInfo", marker),
                ],
            )?;
        }
    }
    Ok(())
}

/// Четыре крошечных острова далеко за пределами карты; возвращает число путей
fn write_ocean_frame<W: GeometryWriter>(writer: &mut W) -> Result<usize, MapError> {
    let node_name = |corner: (f64, f64), j: usize| format!("bbox({},{}){j}", corner.0, corner.1);

    for corner in FRAME_CORNERS {
        for (j, offset) in FRAME_OFFSETS.iter().enumerate() {
            writer.register_named_node(
                &node_name(corner, j),
                corner.0 + offset.0 * FRAME_EPS,
                corner.1 + offset.1 * FRAME_EPS,
                &[],
            )?;
        }
    }

    for (i, corner) in FRAME_CORNERS.into_iter().enumerate() {
        let name = format!("boundingBox{i}");
        writer.begin_way(&name)?;
        // 0, 3, 2, 1, 0: замкнутое кольцо против обхода вершин
        for j in (0..=4).rev() {
            writer.append_node_ref(NodeRef::Named(&node_name(corner, j % 4)))?;
        }
        writer.set_tag("name", &name)?;
        writer.set_tag("natural", "coastline")?;
        writer.end_way()?;
    }
    Ok(FRAME_CORNERS.len())
}

/// Пишет кольцо берега кусками `coast{n}`; возвращает число путей
fn write_coast<W: GeometryWriter>(
    polygon: &Polygon,
    max_nodes: usize,
    counter: &mut usize,
    writer: &mut W,
) -> Result<usize, MapError> {
    let chunks = split_ways(&polygon.points, max_nodes);
    for chunk in &chunks {
        *counter += 1;
        let name = format!("coast{counter}");
        writer.begin_way(&name)?;
        for &point in *chunk {
            writer.append_node_ref(NodeRef::Grid(point))?;
        }
        writer.set_tag("name", &name)?;
        if polygon.kind == PolygonKind::Lake {
            writer.set_tag("natural", "water")?;
            writer.set_tag("water", "lake")?;
        } else {
            writer.set_tag("natural", "coastline")?;
        }
        writer.end_way()?;
    }
    Ok(chunks.len())
}

/// Теги границы одного региона
struct BorderStyle<'a> {
    code: &'a str,
    level: Level,
    color: Option<u32>,
    family: Option<u8>,
}

/// Пишет границу региона кусками `{code}{n}`; нумерация сквозная по всем кольцам региона
fn write_border<W: GeometryWriter>(
    style: &BorderStyle<'_>,
    polygon: &Polygon,
    max_nodes: usize,
    counter: &mut usize,
    writer: &mut W,
) -> Result<usize, MapError> {
    let chunks = split_ways(&polygon.points, max_nodes);
    for chunk in &chunks {
        *counter += 1;
        writer.begin_way(&format!("{}{counter}", style.code))?;
        for &point in *chunk {
            writer.append_node_ref(NodeRef::Grid(point))?;
        }
        writer.set_tag("name", &format!("{}_{counter}", style.code))?;
        writer.set_tag("MSCBorder", &style.level.depth().to_string())?;
        if let Some(color) = style.color {
            writer.set_tag("MSCColor", &color.to_string())?;
        }
        if let Some(family) = style.family {
            writer.set_tag("RusinColor", &family.to_string())?;
        }
        writer.end_way()?;
    }
    Ok(chunks.len())
}

/// Клетки каждого источника вместе с клетками потомков
fn region_cells(grid: &OwnershipGrid, catalog: &SourceCatalog) -> Vec<usize> {
    let direct = grid.cell_counts(catalog);
    let mut total = direct.clone();
    for (idx, &count) in direct.iter().enumerate() {
        if count == 0 {
            continue;
        }
        if let Some(ancestor) = catalog.ancestor(SourceId(idx as u32)) {
            total[ancestor.index()] += count;
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osm::OsmWriter;
    use crate::source::Source;

    fn params(resolution: usize) -> MapGenerationParams {
        MapGenerationParams {
            resolution,
            weight_constant: 300.0,
            ..MapGenerationParams::default()
        }
    }

    fn run(catalog: &SourceCatalog, params: &MapGenerationParams) -> (GeneratedMap, String) {
        let mut writer = OsmWriter::new(Vec::new(), params.resolution).unwrap();
        let map = generate_map(catalog, params, &mut writer).unwrap();
        (map, String::from_utf8(writer.into_inner()).unwrap())
    }

    fn island_catalog() -> SourceCatalog {
        let mut catalog = SourceCatalog::new();
        for (code, x, y) in [("MSC05-XX", 6.0, 6.0), ("MSC11-XX", 6.0, 10.0)] {
            catalog
                .register(Source::new(code, "desc", x, y, 1.0))
                .unwrap();
        }
        catalog
    }

    #[test]
    fn empty_catalog_is_rejected() {
        let mut writer = OsmWriter::new(Vec::new(), 16).unwrap();
        let err = generate_map(&SourceCatalog::new(), &params(16), &mut writer).unwrap_err();
        assert!(matches!(err, MapError::InvalidConfig(_)));
    }

    #[test]
    fn island_map_has_coast_borders_and_frame() {
        let catalog = island_catalog();
        let (map, xml) = run(&catalog, &params(16));

        let summary = &map.summary;
        assert_eq!(summary.grid_level, Level::Top);
        assert!(summary.coast_rings >= 1);
        assert_eq!(summary.regions.len(), 2);
        for region in &summary.regions {
            assert!(region.cells > 0);
            assert!(region.polygons >= 1);
        }
        assert_eq!(summary.regions[0].color, Some(1));
        assert_eq!(summary.regions[1].color, Some(2));
        assert_eq!(summary.regions[0].family, Some(2));
        assert_eq!(summary.regions[1].family, Some(3));
        assert_eq!(summary.diagnostics.orphan_crossings, 0);

        assert!(xml.contains("<tag k='name' v='boundingBox3' />"));
        assert!(xml.contains("<tag k='natural' v='coastline' />"));
        assert!(xml.contains("<tag k='name' v='MSC05-XX_1' />"));
        assert!(xml.contains("<tag k='MSCBorder' v='0' />"));
        assert!(xml.contains("<tag k='RusinColor' v='3' />"));
        assert!(xml.contains("<tag k='MSCInfo' v='0' />"));
        assert!(xml.trim_end().ends_with("</osm>"));
    }

    #[test]
    fn frame_is_optional() {
        let catalog = island_catalog();
        let mut no_frame = params(16);
        no_frame.expand_ocean = false;

        let (with, _) = run(&catalog, &params(16));
        let (without, xml) = run(&catalog, &no_frame);
        assert_eq!(with.summary.ways, without.summary.ways + 4);
        assert!(!xml.contains("boundingBox"));
    }

    #[test]
    fn long_borders_are_split_into_ways() {
        let catalog = island_catalog();
        let mut short = params(16);
        short.max_way_nodes = 8;
        let (map, xml) = run(&catalog, &short);

        for way in xml.split("<way ").skip(1) {
            let body = &way[..way.find("</way>").unwrap()];
            assert!(body.matches("<nd ").count() <= 8, "way too long: {body}");
        }
        // граница региона длиннее 8 точек даёт несколько путей с общей нумерацией
        assert!(xml.contains("<tag k='name' v='MSC05-XX_2' />"));
        assert!(xml.matches("<tag k='MSCBorder' v='0' />").count() > map.summary.regions.len());

        let (full, _) = run(&catalog, &params(16));
        assert!(map.summary.ways > full.summary.ways);
    }

    #[test]
    fn enclosed_water_becomes_lake_way() {
        // кольцо из восьми источников вокруг пустого центра
        let mut catalog = SourceCatalog::new();
        let ring = [
            (6.0, 6.0), (6.0, 12.0), (6.0, 18.0),
            (12.0, 6.0), (12.0, 18.0),
            (18.0, 6.0), (18.0, 12.0), (18.0, 18.0),
        ];
        for (i, (x, y)) in ring.into_iter().enumerate() {
            catalog
                .register(Source::new(format!("MSC{:02}-XX", 10 + i), "", x, y, 1.0))
                .unwrap();
        }
        let params = MapGenerationParams {
            resolution: 24,
            weight_constant: 500.0,
            ..MapGenerationParams::default()
        };
        let (map, xml) = run(&catalog, &params);

        assert!(map.labels.is_lake(12, 12));
        assert!(map.summary.lake_rings >= 1);
        assert!(map.summary.lakes.iter().all(|lake| lake.owner.is_some()));
        assert!(xml.contains("<tag k='water' v='lake' />"));
    }

    #[test]
    fn mid_level_grid_draws_both_levels() {
        let mut catalog = SourceCatalog::new();
        for (code, x, y) in [
            ("MSC05-XX", 8.0, 6.0),
            ("MSC11-XX", 8.0, 11.0),
            ("MSC05Axx", 6.0, 5.0),
            ("MSC05Bxx", 10.0, 6.0),
            ("MSC11Axx", 8.0, 11.0),
        ] {
            catalog.register(Source::new(code, "", x, y, 1.0)).unwrap();
        }
        let (map, xml) = run(&catalog, &params(16));

        assert_eq!(map.summary.grid_level, Level::Mid);
        let top = &map.summary.regions[0];
        assert_eq!(top.code, "MSC05-XX");
        let children: usize = map
            .summary
            .regions
            .iter()
            .filter(|r| r.code.starts_with("MSC05") && r.level == Level::Mid)
            .map(|r| r.cells)
            .sum();
        assert_eq!(top.cells, children);
        assert!(xml.contains("<tag k='MSCBorder' v='1' />"));
        assert!(xml.contains("<tag k='MSCInfo' v='1' />"));
        assert!(map.summary.regions.iter().filter(|r| r.level == Level::Mid).all(|r| r.color.is_none()));
    }
}
