// src/source/mod.rs
//! Источники влияния и их иерархия
//!
//! Источник — класс классификации (например, `MSC05-XX`) с позицией на сетке
//! и весом («площадью»). Уровень выводится из суффикса кода, родитель — из
//! структуры кода и разрешается через каталог по требованию.
//!
//! Порядок регистрации в [`SourceCatalog`] — это стабильный индекс
//! [`SourceId`]. От него зависят разрешение ничьих в поле влияния и порядок
//! жадной раскраски.

pub mod loader;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::MapError;

/// Стабильный индекс источника в порядке регистрации
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(pub u32);

impl SourceId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Уровень иерархии
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Level {
    /// `MSC05-XX`
    Top,
    /// `MSC05Axx`
    Mid,
    /// `MSC05A10`, `MSC05-00`
    Leaf,
}

impl Level {
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        if code.ends_with("XX") {
            Level::Top
        } else if code.ends_with("xx") {
            Level::Mid
        } else {
            Level::Leaf
        }
    }

    /// Числовая глубина: 0 — верхний уровень
    #[must_use]
    pub fn depth(self) -> u8 {
        match self {
            Level::Top => 0,
            Level::Mid => 1,
            Level::Leaf => 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub code: String,
    pub description: String,
    /// Позиция в координатах сетки
    pub x: f64,
    pub y: f64,
    /// Нормализованный вес («площадь»)
    pub weight: f64,
    pub level: Level,
}

impl Source {
    pub fn new(
        code: impl Into<String>,
        description: impl Into<String>,
        x: f64,
        y: f64,
        weight: f64,
    ) -> Self {
        let code = code.into();
        let level = Level::from_code(&code);
        Self {
            code,
            description: description.into(),
            x,
            y,
            weight,
            level,
        }
    }

    /// Код родителя, выведенный из структуры кода.
    ///
    /// `None` для верхнего уровня и для кодов, которые слишком коротки для разбора.
    #[must_use]
    pub fn parent_code(&self) -> Option<String> {
        match self.level {
            Level::Top => None,
            Level::Mid => self.code.get(..5).map(|prefix| format!("{prefix}-XX")),
            Level::Leaf => {
                let prefix = self.code.get(..6)?;
                if prefix.as_bytes()[5] == b'-' {
                    Some(format!("{prefix}XX"))
                } else {
                    Some(format!("{prefix}xx"))
                }
            }
        }
    }
}

/// Упорядоченный по регистрации набор источников всех уровней
#[derive(Debug, Clone, Default)]
pub struct SourceCatalog {
    sources: Vec<Source>,
    by_code: HashMap<String, SourceId>,
}

impl SourceCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Регистрирует источник; коды уникальны в пределах каталога
    pub fn register(&mut self, source: Source) -> Result<SourceId, MapError> {
        if self.by_code.contains_key(&source.code) {
            return Err(MapError::DuplicateSource(source.code));
        }
        let id = SourceId(u32::try_from(self.sources.len()).map_err(|_| {
            MapError::InvalidConfig("too many sources for a single catalog".to_string())
        })?);
        self.by_code.insert(source.code.clone(), id);
        self.sources.push(source);
        Ok(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// # Panics
    /// Если `id` не принадлежит этому каталогу.
    #[must_use]
    pub fn get(&self, id: SourceId) -> &Source {
        &self.sources[id.index()]
    }

    #[must_use]
    pub fn find(&self, code: &str) -> Option<SourceId> {
        self.by_code.get(code).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SourceId, &Source)> + '_ {
        self.sources
            .iter()
            .enumerate()
            .map(|(i, s)| (SourceId(i as u32), s))
    }

    /// Источники уровня `level` в порядке регистрации
    #[must_use]
    pub fn level(&self, level: Level) -> Vec<SourceId> {
        self.iter()
            .filter(|(_, s)| s.level == level)
            .map(|(id, _)| id)
            .collect()
    }

    /// Разрешённый родитель; неизвестный код родителя трактуется как «нет родителя»
    #[must_use]
    pub fn parent(&self, id: SourceId) -> Option<SourceId> {
        let code = self.get(id).parent_code()?;
        self.find(&code)
    }

    /// Корень цепочки родителей (сам источник, если родителя нет)
    #[must_use]
    pub fn root(&self, id: SourceId) -> SourceId {
        let mut current = id;
        // Уровень родителя всегда строго меньше, так что цепочка не длиннее двух шагов
        while let Some(parent) = self.parent(current) {
            if self.get(parent).level >= self.get(current).level {
                break;
            }
            current = parent;
        }
        current
    }

    /// Предок верхнего уровня для границ «страны»; `None`, если у источника нет родителя
    #[must_use]
    pub fn ancestor(&self, id: SourceId) -> Option<SourceId> {
        self.parent(id).map(|_| self.root(id))
    }

    /// Источники без разрешимого родителя в порядке регистрации — вершины графа смежности
    #[must_use]
    pub fn roots(&self) -> Vec<SourceId> {
        self.iter()
            .map(|(id, _)| id)
            .filter(|&id| self.parent(id).is_none())
            .collect()
    }

    /// Уровень, на котором строится сетка: средний, если он есть, иначе верхний
    #[must_use]
    pub fn grid_level(&self) -> Level {
        if self.sources.iter().any(|s| s.level == Level::Mid) {
            Level::Mid
        } else {
            Level::Top
        }
    }

    /// Собирает каталог из сырых записей `PlotData`.
    ///
    /// # Алгоритм
    /// 1. Верхний уровень: координаты из `[-0.5, 0.5]` переводятся в пространство сетки,
    ///    веса нормализуются как `w / w_max · R² / N · share`
    /// 2. Каждая группа детей размещается внутри квадрата со стороной `√2 · √w_parent`
    ///    вокруг родителя, веса детей масштабируются так, чтобы в сумме дать вес родителя
    /// 3. Группы с неизвестным родителем пропускаются с предупреждением
    pub fn from_records(
        top: &[RawRecord],
        children: &[ChildGroup],
        descriptions: &HashMap<String, String>,
        resolution: usize,
        top_level_share: f64,
    ) -> Result<Self, MapError> {
        let mut catalog = Self::new();
        let r = resolution as f64;
        let describe = |code: &str| descriptions.get(code).cloned().unwrap_or_default();

        let area_max = top.iter().map(|rec| rec.area).fold(0.0_f64, f64::max);
        let count = top.len() as f64;
        for rec in top {
            let weight = if area_max > 0.0 {
                rec.area / area_max * r * r / count * top_level_share
            } else {
                warn!(code = %rec.code, "⚠️ Нет положительных площадей, вес оставлен как есть");
                rec.area
            };
            catalog.register_record(Source::new(
                rec.code.as_str(),
                describe(&rec.code),
                to_image_space(rec.x, resolution),
                to_image_space(rec.y, resolution),
                weight,
            ))?;
        }

        for group in children {
            let Some(parent_id) = catalog.find(&group.parent) else {
                warn!(parent = %group.parent, "⚠️ Родитель группы не найден, группа пропущена");
                continue;
            };
            let parent = catalog.get(parent_id).clone();
            let side = std::f64::consts::SQRT_2 * parent.weight.max(0.0).sqrt();
            let area_sum: f64 = group.records.iter().map(|rec| rec.area).sum();
            let factor = if area_sum > 0.0 && parent.weight > 0.0 {
                area_sum / parent.weight
            } else {
                warn!(parent = %group.parent, "⚠️ Нулевая сумма площадей детей, веса не масштабируются");
                1.0
            };

            for rec in &group.records {
                catalog.register_record(Source::new(
                    rec.code.as_str(),
                    describe(&rec.code),
                    to_image_space(rec.x, resolution) * side / r + parent.x,
                    to_image_space(rec.y, resolution) * side / r + parent.y,
                    rec.area / factor,
                ))?;
            }
        }

        Ok(catalog)
    }

    /// Регистрация записи из файла: повтор кода пропускается с предупреждением
    fn register_record(&mut self, source: Source) -> Result<(), MapError> {
        match self.register(source) {
            Ok(_) => Ok(()),
            Err(MapError::DuplicateSource(code)) => {
                warn!(code = %code, "⚠️ Повторный код в данных, запись пропущена");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Одна строка `PlotData.txt`: код, координаты в `[-0.5, 0.5]` и площадь
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub code: String,
    pub x: f64,
    pub y: f64,
    pub area: f64,
}

/// Дети одного родителя (содержимое каталога `MSCxx-XX/PlotData.txt`)
#[derive(Debug, Clone)]
pub struct ChildGroup {
    pub parent: String,
    pub records: Vec<RawRecord>,
}

/// Переводит координату из `[-0.5, 0.5]` в `[0, 0.99 · R]`
#[must_use]
pub fn to_image_space(value: f64, resolution: usize) -> f64 {
    (value + 0.55) * 0.9 * resolution as f64
}
