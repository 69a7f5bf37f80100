// src/field/mod.rs
//! Поле влияния и сетка принадлежности
//!
//! Каждый источник «надувает» вокруг себя косинусный пузырь
//! `f(d, k) = cos(d / k) + 1` с конечным носителем `d ≤ π·k`. Клетка
//! достаётся источнику с максимальной амплитудой; при равенстве побеждает
//! источник, пришедший раньше (сравнение строго «больше»).
//!
//! ## Особенности реализации
//!
//! - Обходится только ограничивающий квадрат носителя, а не вся сетка:
//!   сложность `O(Σ площадь носителя)`
//! - Сумма амплитуд по клетке хранится только для диагностики (min/max)
//! - Память под сетки выделяется через `try_reserve_exact`: нехватка памяти — фатальная ошибка запуска

pub mod png;

use std::f64::consts::PI;
use std::io::Write;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::MapError;
use crate::source::{SourceCatalog, SourceId};

/// Сетка `resolution × resolution` с владельцем и текущей максимальной амплитудой в каждой клетке.
///
/// Клетка `(x, y)` лежит по линейному индексу `x * resolution + y`.
/// `None` в `owners` — вода.
#[derive(Debug, Clone)]
pub struct OwnershipGrid {
    pub resolution: usize,
    pub owners: Vec<Option<SourceId>>,
    pub amplitude: Vec<f64>,
}

impl OwnershipGrid {
    /// Пустая сетка (вся вода)
    pub fn new(resolution: usize) -> Result<Self, MapError> {
        let cells = cell_count(resolution)?;
        Ok(Self {
            resolution,
            owners: filled(cells, None)?,
            amplitude: filled(cells, 0.0)?,
        })
    }

    /// Сетка с заранее известной принадлежностью (амплитуды нулевые).
    ///
    /// # Ошибки
    /// `InvalidConfig`, если длина `owners` не равна `resolution²`.
    pub fn from_owners(resolution: usize, owners: Vec<Option<SourceId>>) -> Result<Self, MapError> {
        let cells = cell_count(resolution)?;
        if owners.len() != cells {
            return Err(MapError::InvalidConfig(format!(
                "expected {cells} owners, got {}",
                owners.len()
            )));
        }
        Ok(Self {
            resolution,
            owners,
            amplitude: filled(cells, 0.0)?,
        })
    }

    #[inline]
    #[must_use]
    pub fn index(&self, x: usize, y: usize) -> usize {
        x * self.resolution + y
    }

    #[must_use]
    pub fn owner(&self, x: usize, y: usize) -> Option<SourceId> {
        self.owners[self.index(x, y)]
    }

    #[must_use]
    pub fn is_water(&self, x: usize, y: usize) -> bool {
        self.owner(x, y).is_none()
    }

    /// Все пары соседних клеток ровно по одному разу: сосед `(x+1, y)` и `(x, y+1)` каждой клетки
    pub fn neighbour_pairs(&self) -> impl Iterator<Item = ((usize, usize), (usize, usize))> + '_ {
        let r = self.resolution;
        (0..r).flat_map(move |x| {
            (0..r).flat_map(move |y| {
                let down = (x + 1 < r).then_some(((x, y), (x + 1, y)));
                let right = (y + 1 < r).then_some(((x, y), (x, y + 1)));
                down.into_iter().chain(right)
            })
        })
    }

    /// Количество клеток, принадлежащих каждому источнику каталога
    #[must_use]
    pub fn cell_counts(&self, catalog: &SourceCatalog) -> Vec<usize> {
        let mut counts = vec![0; catalog.len()];
        for owner in self.owners.iter().flatten() {
            if let Some(count) = counts.get_mut(owner.index()) {
                *count += 1;
            }
        }
        counts
    }

    /// Выгружает сетку в CSV для сервиса поиска: строка сетки на строку файла,
    /// клетки через `;`, вода — `null`.
    pub fn write_csv<W: Write>(
        &self,
        catalog: &SourceCatalog,
        level: GridExportLevel,
        mut out: W,
    ) -> Result<(), MapError> {
        let r = self.resolution;
        for x in 0..r {
            let mut line = String::with_capacity(r * 9);
            for y in 0..r {
                if y > 0 {
                    line.push(';');
                }
                match self.owner(x, y) {
                    Some(id) => {
                        let id = match level {
                            GridExportLevel::Top => catalog.root(id),
                            GridExportLevel::Grid => id,
                        };
                        line.push_str(&catalog.get(id).code);
                    }
                    None => line.push_str("null"),
                }
            }
            writeln!(out, "{line}")?;
        }
        out.flush()?;
        Ok(())
    }
}

/// Уровень, на котором выгружается сетка
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridExportLevel {
    /// Владельцы заменяются корнями иерархии
    Top,
    /// Владельцы как есть
    Grid,
}

/// Диагностика построения поля
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct FieldStats {
    /// Минимум суммы амплитуд среди покрытых клеток
    pub min_sum: f64,
    /// Максимум суммы амплитуд
    pub max_sum: f64,
    pub owned_cells: usize,
    /// Источники с неположительным или нечисловым радиусом
    pub skipped_sources: usize,
}

#[derive(Debug, Clone)]
pub struct InfluenceField {
    pub grid: OwnershipGrid,
    pub stats: FieldStats,
}

/// Радиус пузыря `k = sqrt(C · w / (N · π³ · w_max))`
#[must_use]
pub fn scaling_factor(weight: f64, max_weight: f64, count: usize, weight_constant: f64) -> f64 {
    (weight_constant * weight / (count as f64 * PI.powi(3) * max_weight)).sqrt()
}

/// Косинусный пузырь с конечным носителем: `cos(d/k) + 1` при `d ≤ π·k`, иначе 0
#[must_use]
pub fn bump(dist: f64, k: f64) -> f64 {
    if PI * k < dist.abs() {
        return 0.0;
    }
    (dist / k).cos() + 1.0
}

/// Строит сетку принадлежности для источников `sources` (в порядке итерации)
pub fn build_influence_field(
    catalog: &SourceCatalog,
    sources: &[SourceId],
    resolution: usize,
    weight_constant: f64,
) -> Result<InfluenceField, MapError> {
    let mut grid = OwnershipGrid::new(resolution)?;
    let mut sum = filled(grid.owners.len(), 0.0_f64)?;
    let mut stats = FieldStats::default();

    let max_weight = sources
        .iter()
        .map(|&id| catalog.get(id).weight)
        .fold(0.0_f64, f64::max);
    let last = (resolution - 1) as f64;

    for &id in sources {
        let source = catalog.get(id);
        let k = scaling_factor(source.weight, max_weight, sources.len(), weight_constant);
        if !(k.is_finite() && k > 0.0) {
            warn!(code = %source.code, weight = source.weight, "⚠️ Источник без радиуса влияния пропущен");
            stats.skipped_sources += 1;
            continue;
        }

        let radius = PI * k;
        let x_hi = (source.x + radius).min(last);
        let y_hi = (source.y + radius).min(last);
        if x_hi < 0.0 || y_hi < 0.0 {
            continue;
        }
        let x_lo = (source.x - radius).max(0.0) as usize;
        let y_lo = (source.y - radius).max(0.0) as usize;

        for x in x_lo..=x_hi as usize {
            for y in y_lo..=y_hi as usize {
                let dist = (source.x - x as f64).hypot(source.y - y as f64);
                if dist > radius {
                    continue;
                }
                let value = bump(dist, k);
                let idx = grid.index(x, y);
                // Строго «больше»: при равенстве клетка остаётся за ранним источником
                if grid.amplitude[idx] < value {
                    grid.amplitude[idx] = value;
                    grid.owners[idx] = Some(id);
                }
                sum[idx] += value;
            }
        }
    }

    let mut covered = sum.iter().copied().filter(|&s| s > 0.0).peekable();
    if covered.peek().is_some() {
        let (min_sum, max_sum) =
            covered.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| (lo.min(s), hi.max(s)));
        stats.min_sum = min_sum;
        stats.max_sum = max_sum;
    }
    stats.owned_cells = grid.owners.iter().filter(|o| o.is_some()).count();

    info!(
        "🗺️ Поле влияния: {} источников, {} из {} клеток заняты",
        sources.len() - stats.skipped_sources,
        stats.owned_cells,
        grid.owners.len()
    );
    debug!(min_sum = stats.min_sum, max_sum = stats.max_sum, "Диапазон суммарной амплитуды");

    Ok(InfluenceField { grid, stats })
}

/// Число клеток сетки; сторона меньше 2 клеток не поддерживается
pub(crate) fn cell_count(resolution: usize) -> Result<usize, MapError> {
    if resolution < 2 {
        return Err(MapError::InvalidConfig(format!(
            "resolution must be at least 2, got {resolution}"
        )));
    }
    resolution
        .checked_mul(resolution)
        .ok_or(MapError::GridAllocation { cells: usize::MAX })
}

/// Вектор длины `cells`, заполненный `value`; отказ аллокатора — `GridAllocation`
pub(crate) fn filled<T: Clone>(cells: usize, value: T) -> Result<Vec<T>, MapError> {
    let mut data = Vec::new();
    data.try_reserve_exact(cells)
        .map_err(|_| MapError::GridAllocation { cells })?;
    data.resize(cells, value);
    Ok(data)
}
