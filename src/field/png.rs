// src/field/png.rs
//! Растровое превью карты
//!
//! Клетка `(x, y)` сетки — пиксель в строке `x` и столбце `y`, так что
//! строки изображения совпадают со строками CSV-выгрузки. Суша красится
//! цветом раскраски своего корня, вода — синими оттенками (озёра светлее
//! океана). Позиции источников верхнего уровня отмечаются точками.

use std::path::Path;

use image::{ImageBuffer, Rgba, RgbaImage};
use imageproc::drawing::draw_filled_circle_mut;
use rand::{Rng, SeedableRng};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::coloring::RegionColoring;
use crate::error::MapError;
use crate::field::OwnershipGrid;
use crate::labels::{LAND, LabelGrid, OCEAN};
use crate::source::{Level, SourceCatalog};

const OCEAN_COLOR: [u8; 4] = [30, 60, 150, 255];
const LAKE_COLOR: [u8; 4] = [80, 140, 210, 255];
/// Суша без цвета (корень не попал в граф)
const UNKNOWN_COLOR: [u8; 4] = [0, 0, 0, 255];
const MARKER_COLOR: Rgba<u8> = Rgba([20, 20, 20, 255]);

/// Палитра суши: цвет `i` (с единицы) лежит по индексу `i - 1`.
///
/// Детерминирована для заданного `seed`.
#[must_use]
pub fn land_palette(colors: usize, seed: u64) -> Vec<[u8; 4]> {
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(seed);
    (0..colors)
        .map(|_| {
            [
                rng.gen_range(110..230),
                rng.gen_range(120..240),
                rng.gen_range(60..160),
                255,
            ]
        })
        .collect()
}

/// Собирает превью `R × R`
#[must_use]
pub fn render_preview(
    grid: &OwnershipGrid,
    labels: &LabelGrid,
    catalog: &SourceCatalog,
    coloring: &RegionColoring,
    seed: u64,
) -> RgbaImage {
    let r = grid.resolution;
    let palette = land_palette(coloring.max_degree + 1, seed);

    let pixel = |idx: usize| -> [u8; 4] {
        match grid.owners[idx] {
            Some(id) => coloring
                .color_of(catalog.root(id))
                .and_then(|c| palette.get(c as usize - 1).copied())
                .unwrap_or(UNKNOWN_COLOR),
            None => match labels.labels[idx] {
                OCEAN => OCEAN_COLOR,
                LAND => UNKNOWN_COLOR,
                _ => LAKE_COLOR,
            },
        }
    };

    #[cfg(feature = "parallel")]
    let rgba: Vec<u8> = (0..r * r).into_par_iter().flat_map_iter(pixel).collect();
    #[cfg(not(feature = "parallel"))]
    let rgba: Vec<u8> = (0..r * r).flat_map(pixel).collect();

    let side = r as u32;
    let mut img: RgbaImage = ImageBuffer::from_raw(side, side, rgba)
        .unwrap_or_else(|| ImageBuffer::new(side, side));

    let marker = (r / 256).max(1) as i32;
    for id in catalog.level(Level::Top) {
        let source = catalog.get(id);
        draw_filled_circle_mut(
            &mut img,
            (source.y.round() as i32, source.x.round() as i32),
            marker,
            MARKER_COLOR,
        );
    }
    img
}

/// Сохраняет превью в PNG
pub fn save_preview(img: &RgbaImage, path: impl AsRef<Path>) -> Result<(), MapError> {
    img.save(path.as_ref())?;
    Ok(())
}
