// src/source/loader.rs
//! Чтение каталога источников с диска
//!
//! Формат данных:
//! - `PlotData.txt` — строки `code,x,y,area`, координаты в `[-0.5, 0.5]`
//! - файл описаний — строки `number***description`, ключ `MSC<number>`
//! - дети верхнего класса лежат в соседнем каталоге `MSCxx-XX/PlotData.txt`
//!
//! Битые строки пропускаются с предупреждением; ошибки ввода-вывода фатальны.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::error::MapError;
use crate::source::{ChildGroup, RawRecord, SourceCatalog};

/// Загружает полный каталог: верхний уровень из `plot_data` и все группы детей рядом с ним
pub fn load_catalog(
    plot_data: &Path,
    descriptions: &Path,
    resolution: usize,
    top_level_share: f64,
) -> Result<SourceCatalog, MapError> {
    let descriptions = read_descriptions(descriptions)?;
    let top = read_plot_data(plot_data)?;

    let mut children = Vec::new();
    if let Some(dir) = plot_data.parent() {
        // у относительного `PlotData.txt` родитель — пустой путь
        let dir = if dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            dir
        };
        let entries = fs::read_dir(dir).map_err(|e| MapError::io(dir, e))?;
        let mut group_dirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| MapError::io(dir, e))?;
            let path = entry.path();
            let is_group = path.is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with("MSC"));
            if is_group {
                group_dirs.push(path);
            }
        }
        group_dirs.sort();

        for group_dir in group_dirs {
            let group_plot = group_dir.join("PlotData.txt");
            if !group_plot.exists() {
                continue;
            }
            let Some(parent) = group_dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            children.push(ChildGroup {
                parent: parent.to_string(),
                records: read_plot_data(&group_plot)?,
            });
        }
    }

    info!(
        "📚 Загружено {} классов верхнего уровня и {} групп детей",
        top.len(),
        children.len()
    );
    SourceCatalog::from_records(&top, &children, &descriptions, resolution, top_level_share)
}

pub fn read_plot_data(path: &Path) -> Result<Vec<RawRecord>, MapError> {
    let contents = fs::read_to_string(path).map_err(|e| MapError::io(path, e))?;
    Ok(parse_plot_data(&contents, path))
}

pub fn read_descriptions(path: &Path) -> Result<HashMap<String, String>, MapError> {
    let contents = fs::read_to_string(path).map_err(|e| MapError::io(path, e))?;
    Ok(parse_descriptions(&contents, path))
}

fn parse_plot_data(contents: &str, origin: &Path) -> Vec<RawRecord> {
    let mut records = Vec::new();
    for (lineno, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_record(line) {
            Some(record) => records.push(record),
            None => warn!(
                file = %origin.display(),
                line = lineno + 1,
                "⚠️ Некорректная строка PlotData пропущена"
            ),
        }
    }
    records
}

fn parse_record(line: &str) -> Option<RawRecord> {
    let mut tokens = line.split(',').map(str::trim);
    let code = tokens.next().filter(|c| !c.is_empty())?;
    let x = tokens.next()?.parse::<f64>().ok()?;
    let y = tokens.next()?.parse::<f64>().ok()?;
    let area = tokens.next()?.parse::<f64>().ok()?;
    if !(x.is_finite() && y.is_finite() && area.is_finite()) {
        return None;
    }
    Some(RawRecord {
        code: code.to_string(),
        x,
        y,
        area,
    })
}

fn parse_descriptions(contents: &str, origin: &Path) -> HashMap<String, String> {
    let mut descriptions = HashMap::new();
    for (lineno, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        if let Some((number, text)) = line.split_once("***") {
            descriptions.insert(format!("MSC{}", number.trim()), text.trim().to_string());
        } else {
            warn!(
                file = %origin.display(),
                line = lineno + 1,
                "⚠️ Строка описания без разделителя *** пропущена"
            );
        }
    }
    descriptions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Level;

    #[test]
    fn malformed_plot_lines_are_skipped() {
        let records = parse_plot_data(
            "MSC05-XX,0.1,-0.2,3\n\nbroken line\nMSC11-XX,0.0,NaN,1\nMSC12-XX, 0.3 , 0.4 , 2.5\n",
            Path::new("PlotData.txt"),
        );
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].code, "MSC05-XX");
        assert_eq!(records[1].area, 2.5);
    }

    #[test]
    fn descriptions_are_keyed_with_prefix() {
        let descriptions = parse_descriptions(
            "05-XX***Combinatorics\nno separator\n11-XX***Number theory\n",
            Path::new("Desc.txt"),
        );
        assert_eq!(descriptions.len(), 2);
        assert_eq!(descriptions["MSC05-XX"], "Combinatorics");
    }

    #[test]
    fn load_catalog_reads_child_directories() {
        let dir = tempfile::tempdir().unwrap();
        let plot = dir.path().join("PlotData.txt");
        let desc = dir.path().join("Desc.txt");
        fs::write(&plot, "MSC05-XX,0.0,0.0,2\nMSC11-XX,0.3,0.3,1\n").unwrap();
        fs::write(&desc, "05-XX***Combinatorics\n05Axx***Enumerative\n").unwrap();

        let group = dir.path().join("MSC05-XX");
        fs::create_dir(&group).unwrap();
        fs::write(group.join("PlotData.txt"), "MSC05Axx,0.0,0.0,1\n").unwrap();
        // каталог без PlotData.txt игнорируется
        fs::create_dir(dir.path().join("MSC11-XX")).unwrap();

        let catalog = load_catalog(&plot, &desc, 64, 0.25).unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.level(Level::Mid).len(), 1);

        let child = catalog.get(catalog.find("MSC05Axx").unwrap());
        assert_eq!(child.description, "Enumerative");
        let parent = catalog.get(catalog.find("MSC05-XX").unwrap());
        assert!((child.weight - parent.weight).abs() < 1e-9);
    }

    #[test]
    fn repeated_plot_line_does_not_stop_loading() {
        let dir = tempfile::tempdir().unwrap();
        let plot = dir.path().join("PlotData.txt");
        let desc = dir.path().join("Desc.txt");
        fs::write(
            &plot,
            "MSC05-XX,0.0,0.0,2\nMSC11-XX,0.3,0.3,1\nMSC05-XX,0.1,0.1,5\nMSC60-XX,-0.3,0.2,1\n",
        )
        .unwrap();
        fs::write(&desc, "").unwrap();

        let catalog = load_catalog(&plot, &desc, 64, 0.25).unwrap();
        assert_eq!(catalog.len(), 3);
        assert!(catalog.find("MSC11-XX").is_some());
        assert!(catalog.find("MSC60-XX").is_some());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = read_plot_data(Path::new("/definitely/not/here.txt")).unwrap_err();
        assert!(matches!(err, MapError::Io { .. }));
    }
}
