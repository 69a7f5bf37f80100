// src/boundary.rs
//! Извлечение границ между клетками с разными владельцами
//!
//! Каждая граница растра даёт середину ребра между двумя клетками. Середина
//! хранится в полуединицах, поэтому координаты вида `n + 0.5` сравниваются
//! и хешируются точно, без эпсилонов.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::MapError;
use crate::field::OwnershipGrid;
use crate::osm::GeometryWriter;
use crate::source::{SourceCatalog, SourceId};

/// Точка в пространстве сетки, хранится как удвоенные целые компоненты
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coord {
    hx: i32,
    hy: i32,
}

impl Coord {
    #[must_use]
    pub const fn from_halves(hx: i32, hy: i32) -> Self {
        Self { hx, hy }
    }

    /// Середина ребра между двумя клетками
    #[must_use]
    pub fn between(a: (usize, usize), b: (usize, usize)) -> Self {
        Self {
            hx: (a.0 + b.0) as i32,
            hy: (a.1 + b.1) as i32,
        }
    }

    #[must_use]
    pub fn halves(self) -> (i32, i32) {
        (self.hx, self.hy)
    }

    #[must_use]
    pub fn x(self) -> f64 {
        f64::from(self.hx) / 2.0
    }

    #[must_use]
    pub fn y(self) -> f64 {
        f64::from(self.hy) / 2.0
    }

    #[must_use]
    pub fn distance(self, other: Coord) -> f64 {
        (self.x() - other.x()).hypot(self.y() - other.y())
    }

    /// Клетка, в которую попадает точка (`⌊x⌋, ⌊y⌋`)
    #[must_use]
    pub fn cell(self) -> (usize, usize) {
        (self.hx.max(0) as usize / 2, self.hy.max(0) as usize / 2)
    }

    /// Ровно одна компонента вида `n + 0.5`, другая — целая
    #[must_use]
    pub fn is_edge_midpoint(self) -> bool {
        (self.hx % 2 != 0) != (self.hy % 2 != 0)
    }
}

/// Результат сканирования границ
#[derive(Debug, Clone, Default)]
pub struct Boundaries {
    /// Точки границы каждого региона (владельца клетки или его предка)
    pub regions: BTreeMap<SourceId, BTreeSet<Coord>>,
    /// Точки границы между парой владельцев `(min, max)`
    pub pairs: BTreeMap<(SourceId, SourceId), BTreeSet<Coord>>,
    /// Все точки береговой линии
    pub coastline: BTreeSet<Coord>,
    /// Какой регион лежит на суше у данной точки берега
    pub coast_owner: BTreeMap<Coord, SourceId>,
    /// Переходы «вода–вода», которые не должны были встретиться
    pub orphan_crossings: usize,
}

impl Boundaries {
    fn add_region(&mut self, owner: Option<SourceId>, point: Coord) {
        if let Some(id) = owner {
            self.regions.entry(id).or_default().insert(point);
        }
    }
}

/// Сканирует все пары соседних клеток и регистрирует каждую середину в `writer`
pub fn extract_boundaries<W: GeometryWriter>(
    grid: &OwnershipGrid,
    catalog: &SourceCatalog,
    writer: &mut W,
) -> Result<Boundaries, MapError> {
    let mut out = Boundaries::default();

    for (a, b) in grid.neighbour_pairs() {
        let first = grid.owner(a.0, a.1);
        let second = grid.owner(b.0, b.1);
        if first == second {
            continue;
        }
        let point = Coord::between(a, b);

        out.add_region(first, point);
        out.add_region(second, point);

        let parents = (
            first.and_then(|id| catalog.ancestor(id)),
            second.and_then(|id| catalog.ancestor(id)),
        );
        if parents.0 != parents.1 {
            out.add_region(parents.0, point);
            out.add_region(parents.1, point);
        }

        match (first, second) {
            (Some(p), Some(q)) => {
                let key = if p < q { (p, q) } else { (q, p) };
                out.pairs.entry(key).or_default().insert(point);
            }
            (Some(land), None) | (None, Some(land)) => {
                out.coastline.insert(point);
                out.coast_owner.insert(point, land);
            }
            (None, None) => {
                warn!(x = point.x(), y = point.y(), "⚠️ Не удалось определить владельца берега");
                out.orphan_crossings += 1;
            }
        }

        writer.register_grid_node(point)?;
    }

    info!(
        "✂️ Границы: {} регионов, {} пар, {} точек берега",
        out.regions.len(),
        out.pairs.len(),
        out.coastline.len()
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::build_influence_field;
    use crate::osm::OsmWriter;
    use crate::source::Source;

    #[test]
    fn coord_midpoints_are_exact() {
        let p = Coord::between((3, 4), (4, 4));
        assert_eq!(p.x(), 3.5);
        assert_eq!(p.y(), 4.0);
        assert!(p.is_edge_midpoint());
        assert_eq!(p, Coord::from_halves(7, 8));
        assert_eq!(p.cell(), (3, 4));
        assert!(!Coord::from_halves(2, 2).is_edge_midpoint());
        assert!(!Coord::from_halves(1, 1).is_edge_midpoint());
    }

    fn two_corner_sources() -> (SourceCatalog, Vec<SourceId>) {
        let mut catalog = SourceCatalog::new();
        let a = catalog
            .register(Source::new("MSC01-XX", "", 0.0, 0.0, 1.0))
            .unwrap();
        let b = catalog
            .register(Source::new("MSC02-XX", "", 7.0, 7.0, 1.0))
            .unwrap();
        (catalog, vec![a, b])
    }

    #[test]
    fn opposite_corners_split_along_bisector() {
        let (catalog, ids) = two_corner_sources();
        let field = build_influence_field(&catalog, &ids, 8, 1.05e7).unwrap();
        let grid = &field.grid;

        for x in 0..8 {
            for y in 0..8 {
                let owner = grid.owner(x, y).expect("grid fully covered");
                if x + y < 6 {
                    assert_eq!(owner, ids[0]);
                } else if x + y > 8 {
                    assert_eq!(owner, ids[1]);
                }
            }
        }

        let mut writer = OsmWriter::new(Vec::new(), 8).unwrap();
        let boundaries = extract_boundaries(grid, &catalog, &mut writer).unwrap();

        assert_eq!(boundaries.pairs.len(), 1);
        let midline = &boundaries.pairs[&(ids[0], ids[1])];
        assert!(!midline.is_empty());
        for p in midline {
            assert!((p.x() + p.y() - 7.0).abs() <= 1.5, "{p:?} is off the bisector");
        }
        assert_eq!(&boundaries.regions[&ids[0]], midline);
        assert_eq!(&boundaries.regions[&ids[1]], midline);
        assert!(boundaries.coastline.is_empty());
        assert_eq!(writer.grid_node_count(), midline.len());
    }

    #[test]
    fn every_boundary_point_is_an_edge_midpoint() {
        let mut catalog = SourceCatalog::new();
        let ids: Vec<_> = [("MSC01-XX", 3.0, 3.0), ("MSC02-XX", 10.0, 4.0), ("MSC03-XX", 6.0, 11.0)]
            .iter()
            .map(|&(code, x, y)| catalog.register(Source::new(code, "", x, y, 1.0)).unwrap())
            .collect();
        // радиус носителя ≈ 5.6 клетки: пузыри перекрываются, а углы карты остаются водой
        let field = build_influence_field(&catalog, &ids, 16, 300.0).unwrap();
        let mut writer = OsmWriter::new(Vec::new(), 16).unwrap();
        let boundaries = extract_boundaries(&field.grid, &catalog, &mut writer).unwrap();

        assert!(!boundaries.coastline.is_empty());
        let all = boundaries
            .regions
            .values()
            .flatten()
            .chain(boundaries.coastline.iter());
        for p in all {
            assert!(p.is_edge_midpoint(), "{p:?}");
        }
        for (p, owner) in &boundaries.coast_owner {
            assert!(boundaries.coastline.contains(p));
            assert!(ids.contains(owner));
        }
        assert_eq!(boundaries.orphan_crossings, 0);
    }

    #[test]
    fn mid_level_crossings_feed_parent_borders() {
        let mut catalog = SourceCatalog::new();
        let top_a = catalog
            .register(Source::new("MSC05-XX", "", 0.0, 0.0, 1.0))
            .unwrap();
        let top_b = catalog
            .register(Source::new("MSC11-XX", "", 0.0, 0.0, 1.0))
            .unwrap();
        let a1 = catalog
            .register(Source::new("MSC05Axx", "", 0.0, 0.0, 1.0))
            .unwrap();
        let a2 = catalog
            .register(Source::new("MSC05Bxx", "", 0.0, 0.0, 1.0))
            .unwrap();
        let b1 = catalog
            .register(Source::new("MSC11Axx", "", 0.0, 0.0, 1.0))
            .unwrap();
        // одна строка из трёх клеток: a1 | a2 | b1
        let grid = OwnershipGrid::from_owners(
            3,
            vec![
                Some(a1), Some(a2), Some(b1),
                Some(a1), Some(a2), Some(b1),
                Some(a1), Some(a2), Some(b1),
            ],
        )
        .unwrap();

        let mut writer = OsmWriter::new(Vec::new(), 3).unwrap();
        let boundaries = extract_boundaries(&grid, &catalog, &mut writer).unwrap();

        let inner = Coord::between((0, 0), (0, 1));
        let outer = Coord::between((0, 1), (0, 2));
        assert!(boundaries.regions[&a1].contains(&inner));
        assert!(boundaries.regions[&a2].contains(&outer));
        // a1|a2 — один родитель, граница страны не появляется
        assert!(!boundaries.regions[&top_a].contains(&inner));
        assert!(boundaries.regions[&top_a].contains(&outer));
        assert!(boundaries.regions[&top_b].contains(&outer));
        assert_eq!(writer.grid_node_count(), 6);
    }
}
