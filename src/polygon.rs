// src/polygon.rs
//! Сборка замкнутых полигонов из неупорядоченных граничных точек
//!
//! ## Алгоритм
//!
//! 1. Берётся лексикографически наименьшая оставшаяся точка — начало линии
//! 2. Ищется ближайшая оставшаяся точка: в локальном режиме только в окне
//!    `±window` вокруг текущей, в глобальном — среди всех. Кандидаты
//!    перебираются по порядку, при равенстве расстояний побеждает первый
//! 3. Если лучший кандидат не ближе `close_distance` и не ближе стартовой
//!    точки (или кандидатов нет), линия замыкается на старт
//! 4. Иначе кандидат удаляется из множества и становится текущей точкой
//!
//! Множество точек расходуется: после сборки оно пусто. Один регион может
//! дать несколько непересекающихся полигонов.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::warn;

use crate::boundary::Coord;
use crate::config::{AssemblySettings, SearchMode};
use crate::labels::{LabelGrid, OCEAN};
use crate::source::{Level, SourceId};

/// Радиус окна (в клетках), в котором ищется океан вокруг первой точки берега
const LAKE_WINDOW_RADIUS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PolygonKind {
    Coastline,
    Lake,
    RegionBorder(Level),
}

#[derive(Debug, Clone)]
pub struct Polygon {
    /// Замкнутая последовательность: `points.first() == points.last()`
    pub points: Vec<Coord>,
    pub kind: PolygonKind,
    /// Регион, которому принадлежит граница (для берега — регион на суше у первой точки)
    pub owner: Option<SourceId>,
}

/// Полигоны одного множества точек и число вынужденных замыканий
#[derive(Debug, Clone, Default)]
pub struct Assembly {
    pub polygons: Vec<Polygon>,
    pub forced_closures: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolygonAssembler {
    pub mode: SearchMode,
    pub window: i32,
    pub close_distance: f64,
}

impl PolygonAssembler {
    #[must_use]
    pub fn new(mode: SearchMode, settings: &AssemblySettings) -> Self {
        Self {
            mode,
            window: settings.window,
            close_distance: settings.close_distance,
        }
    }

    /// Расходует `points`, возвращая замкнутые кольца и число вынужденных замыканий
    pub fn assemble_rings(&self, points: &mut BTreeSet<Coord>) -> (Vec<Vec<Coord>>, usize) {
        let mut rings = Vec::new();
        let mut forced = 0;

        while let Some(start) = points.pop_first() {
            let mut ring = vec![start];
            let mut current = start;

            loop {
                let back = current.distance(start);
                match self.nearest(points, current) {
                    Some((next, dist)) if dist < self.close_distance || dist < back => {
                        points.remove(&next);
                        ring.push(next);
                        current = next;
                    }
                    _ => {
                        if back >= self.close_distance {
                            warn!(
                                x = start.x(),
                                y = start.y(),
                                gap = back,
                                "⚠️ Линия замкнута через разрыв"
                            );
                            forced += 1;
                        }
                        ring.push(start);
                        break;
                    }
                }
            }
            rings.push(ring);
        }
        (rings, forced)
    }

    fn nearest(&self, points: &BTreeSet<Coord>, current: Coord) -> Option<(Coord, f64)> {
        let mut best: Option<(Coord, f64)> = None;
        let mut consider = |p: Coord| {
            let dist = current.distance(p);
            if best.is_none_or(|(_, d)| dist < d) {
                best = Some((p, dist));
            }
        };

        match self.mode {
            SearchMode::Global => points.iter().copied().for_each(&mut consider),
            SearchMode::Local => {
                let (cx, cy) = current.halves();
                let w = self.window.max(0) * 2;
                for hx in cx - w..=cx + w {
                    let lo = Coord::from_halves(hx, cy - w);
                    let hi = Coord::from_halves(hx, cy + w);
                    points.range(lo..=hi).copied().for_each(&mut consider);
                }
            }
        }
        best
    }

    /// Береговая линия: кольца ориентируются и делятся на берег и озёра
    pub fn coastline(
        &self,
        points: &mut BTreeSet<Coord>,
        labels: &LabelGrid,
        coast_owner: &BTreeMap<Coord, SourceId>,
    ) -> Assembly {
        let (rings, forced_closures) = self.assemble_rings(points);
        let polygons = rings
            .into_iter()
            .map(|mut ring| {
                let kind = classify_coast(&ring, labels);
                let owner = ring.first().and_then(|p| coast_owner.get(p).copied());
                orient(&mut ring);
                Polygon {
                    points: ring,
                    kind,
                    owner,
                }
            })
            .collect();
        Assembly {
            polygons,
            forced_closures,
        }
    }

    /// Граница одного региона
    pub fn region(&self, points: &mut BTreeSet<Coord>, owner: SourceId, level: Level) -> Assembly {
        let (rings, forced_closures) = self.assemble_rings(points);
        let polygons = rings
            .into_iter()
            .map(|mut ring| {
                orient(&mut ring);
                Polygon {
                    points: ring,
                    kind: PolygonKind::RegionBorder(level),
                    owner: Some(owner),
                }
            })
            .collect();
        Assembly {
            polygons,
            forced_closures,
        }
    }
}

/// Площадь по формуле трапеций: `½ Σ (x₂ − x₁)(y₂ + y₁)` по последовательным парам
#[must_use]
pub fn signed_area(ring: &[Coord]) -> f64 {
    ring.windows(2)
        .map(|w| (w[1].x() - w[0].x()) * (w[1].y() + w[0].y()))
        .sum::<f64>()
        / 2.0
}

/// Приводит кольцо к неотрицательной ориентированной площади
pub fn orient(ring: &mut [Coord]) {
    if signed_area(ring) < 0.0 {
        ring.reverse();
    }
}

/// Озеро, если в окне ±2 клетки вокруг первой точки нет океана
#[must_use]
pub fn classify_coast(ring: &[Coord], labels: &LabelGrid) -> PolygonKind {
    let Some(first) = ring.first() else {
        return PolygonKind::Coastline;
    };
    let (x, y) = first.cell();
    let last = labels.resolution.saturating_sub(1);
    if labels.window_min(x.min(last), y.min(last), LAKE_WINDOW_RADIUS) == OCEAN {
        PolygonKind::Coastline
    } else {
        PolygonKind::Lake
    }
}

/// Делит линию на пути не длиннее `max_nodes` узлов; соседние пути делят ровно один узел
#[must_use]
pub fn split_ways(points: &[Coord], max_nodes: usize) -> Vec<&[Coord]> {
    if points.is_empty() {
        return Vec::new();
    }
    let max_nodes = max_nodes.max(2);
    let mut ways = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + max_nodes).min(points.len());
        ways.push(&points[start..end]);
        if end >= points.len() {
            break;
        }
        start += max_nodes - 1;
    }
    ways
}
