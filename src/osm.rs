// src/osm.rs
//! Запись геометрии в формат OSM XML
//!
//! Узлы сетки получают идентификатор из своих полуцелых компонент
//! (`2·R·hx + hy`), поэтому одна и та же середина ребра всегда даёт один и
//! тот же узел. Повторная регистрация — не ошибка, а пустая операция:
//! сканер границ встречает одну точку из нескольких пар клеток.
//!
//! Именованные узлы (столицы, рамка) и пути получают идентификатор из
//! детерминированного хеша имени; у именованных узлов он отрицательный,
//! чтобы не пересекаться с узлами сетки.

use std::collections::HashSet;
use std::io::Write;

use crate::boundary::Coord;
use crate::error::MapError;

/// Ссылка на узел внутри пути
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Grid(Coord),
    Named(&'a str),
}

/// Приёмник векторной геометрии
pub trait GeometryWriter {
    /// Идемпотентная регистрация узла сетки
    fn register_grid_node(&mut self, coord: Coord) -> Result<(), MapError>;

    fn register_named_node(
        &mut self,
        name: &str,
        lat: f64,
        lon: f64,
        tags: &[(&str, &str)],
    ) -> Result<(), MapError>;

    fn begin_way(&mut self, name: &str) -> Result<(), MapError>;

    fn append_node_ref(&mut self, node: NodeRef<'_>) -> Result<(), MapError>;

    fn set_tag(&mut self, key: &str, value: &str) -> Result<(), MapError>;

    fn end_way(&mut self) -> Result<(), MapError>;

    fn finalize(&mut self) -> Result<(), MapError>;
}

pub struct OsmWriter<W: Write> {
    out: W,
    resolution: usize,
    grid_nodes: HashSet<i64>,
    named_nodes: HashSet<i64>,
    way_open: bool,
    finalized: bool,
}

impl<W: Write> OsmWriter<W> {
    /// Создаёт писатель и сразу выводит заголовок XML
    pub fn new(mut out: W, resolution: usize) -> Result<Self, MapError> {
        writeln!(out, "<?xml version='1.0' encoding='UTF-8'?>")?;
        writeln!(out, "<osm version='0.6' generator='mathmap'>")?;
        Ok(Self {
            out,
            resolution,
            grid_nodes: HashSet::new(),
            named_nodes: HashSet::new(),
            way_open: false,
            finalized: false,
        })
    }

    #[must_use]
    pub fn grid_node_id(&self, coord: Coord) -> i64 {
        let (hx, hy) = coord.halves();
        2 * self.resolution as i64 * i64::from(hx) + i64::from(hy)
    }

    #[must_use]
    pub fn grid_node_count(&self) -> usize {
        self.grid_nodes.len()
    }

    /// Возвращает внутренний поток (после `finalize`)
    pub fn into_inner(self) -> W {
        self.out
    }

    fn require_open(&self, op: &str) -> Result<(), MapError> {
        if self.finalized {
            Err(MapError::Writer(format!("{op} after finalize")))
        } else {
            Ok(())
        }
    }

    fn require_way(&self, op: &str) -> Result<(), MapError> {
        if self.way_open {
            Ok(())
        } else {
            Err(MapError::Writer(format!("{op} outside of a way")))
        }
    }
}

impl<W: Write> GeometryWriter for OsmWriter<W> {
    fn register_grid_node(&mut self, coord: Coord) -> Result<(), MapError> {
        self.require_open("grid node")?;
        let id = self.grid_node_id(coord);
        if !self.grid_nodes.insert(id) {
            return Ok(());
        }
        let r = self.resolution as f64;
        writeln!(
            self.out,
            "<node id='{id}' lat='{:.7}' lon='{:.7}' visible='true' version='1' />",
            coord.x() / r,
            coord.y() / r
        )?;
        Ok(())
    }

    fn register_named_node(
        &mut self,
        name: &str,
        lat: f64,
        lon: f64,
        tags: &[(&str, &str)],
    ) -> Result<(), MapError> {
        self.require_open("named node")?;
        let id = named_node_id(name);
        if !self.named_nodes.insert(id) {
            return Ok(());
        }
        write!(
            self.out,
            "<node id='{id}' lat='{lat:.7}' lon='{lon:.7}' visible='true' version='1'>"
        )?;
        for (key, value) in tags {
            writeln!(self.out, "<tag k='{}' v='{}' />", escape(key), escape(value))?;
        }
        writeln!(self.out, "</node>")?;
        Ok(())
    }

    fn begin_way(&mut self, name: &str) -> Result<(), MapError> {
        self.require_open("way")?;
        if self.way_open {
            return Err(MapError::Writer(format!(
                "way {name} started before the previous one ended"
            )));
        }
        self.way_open = true;
        writeln!(
            self.out,
            "<way id='{}' action='modify' visible='true' version='1'>",
            name_hash(name)
        )?;
        Ok(())
    }

    fn append_node_ref(&mut self, node: NodeRef<'_>) -> Result<(), MapError> {
        self.require_way("node reference")?;
        let id = match node {
            NodeRef::Grid(coord) => self.grid_node_id(coord),
            NodeRef::Named(name) => named_node_id(name),
        };
        writeln!(self.out, "<nd ref='{id}' />")?;
        Ok(())
    }

    fn set_tag(&mut self, key: &str, value: &str) -> Result<(), MapError> {
        self.require_way("tag")?;
        writeln!(self.out, "<tag k='{}' v='{}' />", escape(key), escape(value))?;
        Ok(())
    }

    fn end_way(&mut self) -> Result<(), MapError> {
        self.require_way("end of way")?;
        self.way_open = false;
        writeln!(self.out, "</way>")?;
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), MapError> {
        if self.way_open {
            return Err(MapError::Writer("finalize with an open way".to_string()));
        }
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;
        writeln!(self.out, "</osm>")?;
        self.out.flush()?;
        Ok(())
    }
}

/// 32-битный FNV-1a: стабилен между запусками и платформами
#[must_use]
pub fn name_hash(name: &str) -> i64 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in name.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    i64::from(hash)
}

#[must_use]
pub fn named_node_id(name: &str) -> i64 {
    -(name_hash(name) + 1)
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
