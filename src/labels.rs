// src/labels.rs
//! Разметка воды: открытый океан или озеро
//!
//! Метка `0` — вода, связанная с краем карты (океан). Любая другая метка у
//! водной клетки — замкнутый карман (озеро). Клетки суши получают [`LAND`].

use std::collections::VecDeque;

use tracing::info;

use crate::config::LabelingStrategy;
use crate::error::MapError;
use crate::field::{OwnershipGrid, cell_count, filled};

/// Метка открытого океана
pub const OCEAN: u32 = 0;
/// Метка клетки суши
pub const LAND: u32 = u32::MAX;

const NEIGHBOURS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

#[derive(Debug, Clone)]
pub struct LabelGrid {
    pub resolution: usize,
    pub labels: Vec<u32>,
}

impl LabelGrid {
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> u32 {
        self.labels[x * self.resolution + y]
    }

    #[must_use]
    pub fn is_ocean(&self, x: usize, y: usize) -> bool {
        self.get(x, y) == OCEAN
    }

    #[must_use]
    pub fn is_lake(&self, x: usize, y: usize) -> bool {
        let label = self.get(x, y);
        label != OCEAN && label != LAND
    }

    /// Минимальная метка в окне `±radius` вокруг клетки (окно обрезается по краям)
    #[must_use]
    pub fn window_min(&self, x: usize, y: usize, radius: usize) -> u32 {
        let Some(last) = self.resolution.checked_sub(1) else {
            return LAND;
        };
        let mut min = LAND;
        for wx in x.saturating_sub(radius)..=(x + radius).min(last) {
            for wy in y.saturating_sub(radius)..=(y + radius).min(last) {
                min = min.min(self.get(wx, wy));
            }
        }
        min
    }
}

pub fn label_water(grid: &OwnershipGrid, strategy: LabelingStrategy) -> Result<LabelGrid, MapError> {
    cell_count(grid.resolution)?;
    let labels = match strategy {
        LabelingStrategy::FloodFill => flood_fill(grid)?,
        LabelingStrategy::Raster => raster_relaxation(grid)?,
    };
    let lakes = labels
        .labels
        .iter()
        .filter(|&&l| l != OCEAN && l != LAND)
        .count();
    info!("🌊 Разметка воды ({strategy:?}): {lakes} клеток озёр");
    Ok(labels)
}

/// BFS от всех водных клеток края карты; оставшиеся компоненты — озёра
/// с меткой, равной линейному индексу их первой клетки.
fn flood_fill(grid: &OwnershipGrid) -> Result<LabelGrid, MapError> {
    let r = grid.resolution;
    let mut labels = filled(r * r, LAND)?;
    let mut visited = filled(r * r, false)?;
    let mut queue = VecDeque::new();

    for x in 0..r {
        for y in 0..r {
            let on_border = x == 0 || y == 0 || x == r - 1 || y == r - 1;
            let idx = grid.index(x, y);
            if on_border && grid.owners[idx].is_none() {
                visited[idx] = true;
                queue.push_back((x, y));
            }
        }
    }
    fill_component(grid, OCEAN, &mut queue, &mut visited, &mut labels);

    for x in 0..r {
        for y in 0..r {
            let idx = grid.index(x, y);
            if visited[idx] || grid.owners[idx].is_some() {
                continue;
            }
            visited[idx] = true;
            queue.push_back((x, y));
            fill_component(grid, idx as u32, &mut queue, &mut visited, &mut labels);
        }
    }

    Ok(LabelGrid {
        resolution: r,
        labels,
    })
}

fn fill_component(
    grid: &OwnershipGrid,
    label: u32,
    queue: &mut VecDeque<(usize, usize)>,
    visited: &mut [bool],
    labels: &mut [u32],
) {
    let r = grid.resolution as isize;
    while let Some((x, y)) = queue.pop_front() {
        labels[grid.index(x, y)] = label;
        for &(dx, dy) in &NEIGHBOURS {
            let nx = x as isize + dx;
            let ny = y as isize + dy;
            if nx < 0 || ny < 0 || nx >= r || ny >= r {
                continue;
            }
            let nidx = grid.index(nx as usize, ny as usize);
            if !visited[nidx] && grid.owners[nidx].is_none() {
                visited[nidx] = true;
                queue.push_back((nx as usize, ny as usize));
            }
        }
    }
}

/// Двухпроходная релаксация минимума по окрестности 3×3.
///
/// Углы `(0, 0)` и `(R-1, 0)` принудительно получают метку 0. Карманы,
/// связанные с океаном только немонотонным путём, могут остаться с ненулевой меткой.
fn raster_relaxation(grid: &OwnershipGrid) -> Result<LabelGrid, MapError> {
    let r = grid.resolution;
    let mut labels = filled(r * r, LAND)?;
    for (idx, owner) in grid.owners.iter().enumerate() {
        if owner.is_none() {
            labels[idx] = idx as u32;
        }
    }
    labels[grid.index(0, 0)] = OCEAN;
    labels[grid.index(r - 1, 0)] = OCEAN;

    // Прямой проход: строки снизу вверх, уже посещены строка x+1 и клетка (x, y-1)
    for x in (0..r).rev() {
        for y in 0..r {
            let idx = grid.index(x, y);
            if grid.owners[idx].is_some() {
                continue;
            }
            let mut min = labels[idx];
            if x + 1 < r {
                for ny in y.saturating_sub(1)..=(y + 1).min(r - 1) {
                    min = min.min(labels[grid.index(x + 1, ny)]);
                }
            }
            if y > 0 {
                min = min.min(labels[grid.index(x, y - 1)]);
            }
            labels[idx] = min;
        }
    }

    // Обратный проход: строки сверху вниз, справа налево
    for x in 0..r {
        for y in (0..r).rev() {
            let idx = grid.index(x, y);
            if grid.owners[idx].is_some() {
                continue;
            }
            let mut min = labels[idx];
            if x > 0 {
                for ny in y.saturating_sub(1)..=(y + 1).min(r - 1) {
                    min = min.min(labels[grid.index(x - 1, ny)]);
                }
            }
            if y + 1 < r {
                min = min.min(labels[grid.index(x, y + 1)]);
            }
            labels[idx] = min;
        }
    }

    Ok(LabelGrid {
        resolution: r,
        labels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceId;

    /// 16×16: вода в столбце y = 0 (касается угловых якорей) и карман 3×3 в x, y ∈ 6..9
    fn pocket_grid() -> OwnershipGrid {
        let r = 16;
        let mut owners = vec![Some(SourceId(0)); r * r];
        for x in 0..r {
            owners[x * r] = None;
        }
        for x in 6..9 {
            for y in 6..9 {
                owners[x * r + y] = None;
            }
        }
        OwnershipGrid::from_owners(r, owners).unwrap()
    }

    #[test]
    fn enclosed_pocket_is_lake_in_both_strategies() {
        let grid = pocket_grid();
        for strategy in [LabelingStrategy::FloodFill, LabelingStrategy::Raster] {
            let labels = label_water(&grid, strategy).unwrap();
            for x in 6..9 {
                for y in 6..9 {
                    assert!(labels.is_lake(x, y), "{strategy:?}: ({x}, {y}) must be lake");
                }
            }
            for x in 0..16 {
                assert!(labels.is_ocean(x, 0), "{strategy:?}: ({x}, 0) must be ocean");
            }
            assert_eq!(labels.get(3, 3), LAND);
        }
    }

    #[test]
    fn flood_fill_gives_one_label_per_lake() {
        let grid = pocket_grid();
        let labels = label_water(&grid, LabelingStrategy::FloodFill).unwrap();
        let first = labels.get(6, 6);
        assert_eq!(first, (6 * 16 + 6) as u32);
        for x in 6..9 {
            for y in 6..9 {
                assert_eq!(labels.get(x, y), first);
            }
        }
    }

    #[test]
    fn flood_fill_follows_winding_channel() {
        // Канал от края: вниз по y = 1, затем вверх по y = 3 до кармана.
        // Двухпроходная релаксация такой путь не сходит, BFS — сходит.
        let r = 10;
        let mut owners = vec![Some(SourceId(0)); r * r];
        let water = |owners: &mut Vec<Option<SourceId>>, x: usize, y: usize| owners[x * r + y] = None;
        water(&mut owners, 0, 0);
        for x in 0..8 {
            water(&mut owners, x, 1);
        }
        water(&mut owners, 8, 2);
        for x in 2..9 {
            water(&mut owners, x, 3);
        }
        water(&mut owners, 2, 4);
        let grid = OwnershipGrid::from_owners(r, owners).unwrap();

        let labels = label_water(&grid, LabelingStrategy::FloodFill).unwrap();
        assert!(labels.is_ocean(2, 4));
        assert!(labels.is_ocean(8, 2));
    }

    #[test]
    fn empty_label_grid_has_no_water() {
        let labels = LabelGrid {
            resolution: 0,
            labels: Vec::new(),
        };
        assert_eq!(labels.window_min(0, 0, 2), LAND);

        let grid = OwnershipGrid {
            resolution: 0,
            owners: Vec::new(),
            amplitude: Vec::new(),
        };
        assert!(matches!(
            label_water(&grid, LabelingStrategy::FloodFill),
            Err(MapError::InvalidConfig(_))
        ));
    }

    #[test]
    fn window_min_sees_nearby_ocean() {
        let grid = pocket_grid();
        let labels = label_water(&grid, LabelingStrategy::FloodFill).unwrap();
        assert_eq!(labels.window_min(5, 1, 2), OCEAN);
        assert_ne!(labels.window_min(7, 7, 2), OCEAN);
        assert_eq!(labels.window_min(3, 12, 2), LAND);
    }
}
