// src/config.rs
//! Конфигурация генерации карты
//!
//! Этот модуль определяет все параметры, управляющие построением карты:
//! - Разрешение сетки и константу масштаба «пузырей» влияния
//! - Нормализацию весов верхнего уровня
//! - Стратегию разметки воды (океан / озёра)
//! - Параметры сборки полигонов и разбиения линий на OSM-пути
//!
//! Все структуры поддерживают сериализацию в TOML/JSON для удобной настройки через конфигурационные файлы.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::MapError;

/// Максимальное поддерживаемое разрешение: линейный индекс клетки должен помещаться в `u32`.
pub const MAX_RESOLUTION: usize = 16_384;

/// Стратегия разметки водных клеток
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LabelingStrategy {
    /// BFS от края карты по 8-связной воде: точная классификация
    #[default]
    FloodFill,
    /// Двухпроходная релаксация минимума (старый формат вывода, приближённая)
    Raster,
}

/// Режим поиска следующей точки при сборке полигона
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Только окно `±window` вокруг текущей точки
    #[default]
    Local,
    /// Перебор всего оставшегося множества
    Global,
}

/// Настройки сборки полигонов из граничных точек
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssemblySettings {
    /// Полуширина окна локального поиска в клетках (по умолчанию 2 → окно 5×5)
    #[serde(default = "default_window")]
    pub window: i32,

    /// Порог расстояния, начиная с которого линия замыкается на стартовую точку
    #[serde(default = "default_close_distance")]
    pub close_distance: f64,

    /// Режим поиска для береговой линии
    #[serde(default)]
    pub coast_search: SearchMode,

    /// Режим поиска для границ регионов
    #[serde(default)]
    pub border_search: SearchMode,
}

fn default_window() -> i32 {
    2
}
fn default_close_distance() -> f64 {
    5.0
}

impl Default for AssemblySettings {
    fn default() -> Self {
        Self {
            window: 2,
            close_distance: 5.0,
            coast_search: SearchMode::Local,
            border_search: SearchMode::Local,
        }
    }
}

/// Основные параметры генерации карты
///
/// Полная конфигурация одного запуска. Поддерживает загрузку из TOML-файлов.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MapGenerationParams {
    /// Сторона квадратной сетки в клетках (по умолчанию 1024)
    #[serde(default = "default_resolution")]
    pub resolution: usize,

    /// Эмпирическая константа `C` в радиусе влияния
    /// `k = sqrt(C · w / (N · π³ · w_max))`.
    ///
    /// Подобрана вручную под разрешение 1024; для других наборов данных её нужно перенастраивать.
    #[serde(default = "default_weight_constant")]
    pub weight_constant: f64,

    /// Доля площади карты, которую в сумме занимают области верхнего уровня
    #[serde(default = "default_top_level_share")]
    pub top_level_share: f64,

    /// Стратегия разметки воды
    #[serde(default)]
    pub labeling: LabelingStrategy,

    /// Настройки сборки полигонов
    #[serde(default)]
    pub assembly: AssemblySettings,

    /// Максимум узлов в одном OSM-пути
    #[serde(default = "default_max_way_nodes")]
    pub max_way_nodes: usize,

    /// Добавлять ли крошечные острова в углах рамки (±5, ±5), чтобы рендерер залил океан целиком
    #[serde(default = "default_expand_ocean")]
    pub expand_ocean: bool,

    /// Сид палитры превью
    #[serde(default)]
    pub palette_seed: u64,
}

fn default_resolution() -> usize {
    1024
}
fn default_weight_constant() -> f64 {
    1.05e7
}
fn default_top_level_share() -> f64 {
    0.25
}
fn default_max_way_nodes() -> usize {
    2000
}
fn default_expand_ocean() -> bool {
    true
}

impl Default for MapGenerationParams {
    fn default() -> Self {
        Self {
            resolution: 1024,
            weight_constant: 1.05e7,
            top_level_share: 0.25,
            labeling: LabelingStrategy::FloodFill,
            assembly: AssemblySettings::default(),
            max_way_nodes: 2000,
            expand_ocean: true,
            palette_seed: 0,
        }
    }
}

impl MapGenerationParams {
    /// Загружает параметры из TOML-файла
    ///
    /// # Ошибки
    /// Возвращает ошибку, если файл не найден, содержит недопустимый формат
    /// или значения не проходят [`MapGenerationParams::validate`].
    ///
    /// # Пример
    /// ```toml
    /// # map.toml
    /// resolution = 512
    /// labeling = "raster"
    ///
    /// [assembly]
    /// border_search = "global"
    /// ```
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, MapError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| MapError::io(path, e))?;
        let params: Self = toml::from_str(&contents)?;
        params.validate()?;
        Ok(params)
    }

    /// Проверяет границы параметров
    pub fn validate(&self) -> Result<(), MapError> {
        if !(2..=MAX_RESOLUTION).contains(&self.resolution) {
            return Err(MapError::InvalidConfig(format!(
                "resolution must be in 2..={MAX_RESOLUTION}, got {}",
                self.resolution
            )));
        }
        if !(self.weight_constant.is_finite() && self.weight_constant > 0.0) {
            return Err(MapError::InvalidConfig(format!(
                "weight_constant must be positive, got {}",
                self.weight_constant
            )));
        }
        if !(self.top_level_share.is_finite() && self.top_level_share > 0.0) {
            return Err(MapError::InvalidConfig(format!(
                "top_level_share must be positive, got {}",
                self.top_level_share
            )));
        }
        if self.max_way_nodes < 2 {
            return Err(MapError::InvalidConfig(
                "max_way_nodes must be at least 2".to_string(),
            ));
        }
        if self.assembly.window < 1 {
            return Err(MapError::InvalidConfig(
                "assembly.window must be at least 1".to_string(),
            ));
        }
        if !(self.assembly.close_distance.is_finite() && self.assembly.close_distance > 0.0) {
            return Err(MapError::InvalidConfig(
                "assembly.close_distance must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let params: MapGenerationParams = toml::from_str("").unwrap();
        assert_eq!(params, MapGenerationParams::default());
        assert!(params.validate().is_ok());
    }

    #[test]
    fn partial_toml_overrides_fields() {
        let params: MapGenerationParams = toml::from_str(
            r#"
            resolution = 64
            labeling = "raster"

            [assembly]
            border_search = "global"
            "#,
        )
        .unwrap();

        assert_eq!(params.resolution, 64);
        assert_eq!(params.labeling, LabelingStrategy::Raster);
        assert_eq!(params.assembly.border_search, SearchMode::Global);
        assert_eq!(params.assembly.coast_search, SearchMode::Local);
        assert_eq!(params.assembly.window, 2);
        assert_eq!(params.max_way_nodes, 2000);
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut params = MapGenerationParams {
            resolution: 1,
            ..MapGenerationParams::default()
        };
        assert!(matches!(params.validate(), Err(MapError::InvalidConfig(_))));

        params.resolution = 16;
        params.max_way_nodes = 1;
        assert!(params.validate().is_err());

        params.max_way_nodes = 2;
        params.assembly.close_distance = 0.0;
        assert!(params.validate().is_err());
    }

    #[test]
    fn from_toml_file_reads_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.toml");
        fs::write(&path, "resolution = 128\nexpand_ocean = false\n").unwrap();

        let params = MapGenerationParams::from_toml_file(&path).unwrap();
        assert_eq!(params.resolution, 128);
        assert!(!params.expand_ocean);

        fs::write(&path, "resolution = 0\n").unwrap();
        assert!(MapGenerationParams::from_toml_file(&path).is_err());
    }
}
