// src/coloring.rs
//! Граф смежности регионов верхнего уровня и его раскраска
//!
//! Вершины — корни иерархии в порядке регистрации в каталоге, ребро — хотя
//! бы одна общая граница на растре. Раскраска жадная и зависит от порядка:
//! вершина получает наименьший цвет из `1..=max_degree+1`, не занятый уже
//! раскрашенными соседями. Результат детерминирован, корректен и использует
//! не больше `max_degree + 1` цветов, но не обязательно минимален.

use std::collections::{HashMap, HashSet};

use petgraph::graph::{NodeIndex, UnGraph};
use serde::Serialize;
use tracing::info;

use crate::field::OwnershipGrid;
use crate::source::{SourceCatalog, SourceId};

/// Строит граф смежности корней по всем парам соседних клеток
#[must_use]
pub fn build_adjacency_graph(grid: &OwnershipGrid, catalog: &SourceCatalog) -> UnGraph<SourceId, ()> {
    let mut graph = UnGraph::new_undirected();
    let mut id_to_node = HashMap::new();
    for root in catalog.roots() {
        id_to_node.insert(root, graph.add_node(root));
    }

    let mut edges = HashSet::new();
    for (a, b) in grid.neighbour_pairs() {
        let first = grid.owner(a.0, a.1).map(|id| catalog.root(id));
        let second = grid.owner(b.0, b.1).map(|id| catalog.root(id));
        let (Some(p), Some(q)) = (first, second) else {
            continue;
        };
        if p == q {
            continue;
        }
        let key = if p < q { (p, q) } else { (q, p) };
        if !edges.insert(key) {
            continue;
        }
        if let (Some(&na), Some(&nb)) = (id_to_node.get(&key.0), id_to_node.get(&key.1)) {
            graph.add_edge(na, nb, ());
        }
    }
    graph
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RegionColoring {
    /// Цвет (≥ 1) каждого корня
    pub colors: HashMap<SourceId, u32>,
    pub max_degree: usize,
}

impl RegionColoring {
    #[must_use]
    pub fn color_of(&self, id: SourceId) -> Option<u32> {
        self.colors.get(&id).copied()
    }

    /// Число различных использованных цветов
    #[must_use]
    pub fn color_count(&self) -> usize {
        self.colors.values().collect::<HashSet<_>>().len()
    }
}

/// Жадная раскраска в порядке индексов вершин
#[must_use]
pub fn color_graph(graph: &UnGraph<SourceId, ()>) -> RegionColoring {
    let max_degree = graph
        .node_indices()
        .map(|n| graph.neighbors(n).count())
        .max()
        .unwrap_or(0);
    let palette = max_degree as u32 + 1;

    let mut assigned: Vec<u32> = vec![0; graph.node_count()];
    for node in graph.node_indices() {
        let taken: HashSet<u32> = graph
            .neighbors(node)
            .map(|n: NodeIndex| assigned[n.index()])
            .filter(|&c| c != 0)
            .collect();
        assigned[node.index()] = (1..=palette)
            .find(|c| !taken.contains(c))
            .unwrap_or(palette);
    }

    let colors: HashMap<SourceId, u32> = graph
        .node_indices()
        .map(|n| (graph[n], assigned[n.index()]))
        .collect();
    let coloring = RegionColoring { colors, max_degree };
    info!(
        "🎨 Раскраска: {} регионов, {} цветов (максимальная степень {})",
        graph.node_count(),
        coloring.color_count(),
        max_degree
    );
    coloring
}

/// Тематические семейства (по карте математики Д. Русина):
///  1 — основания, 2 — комбинаторика, 3 — теория чисел, 4 — алгебра,
///  5 — геометрия, 6 — топология, 7 — функциональный анализ,
///  8 — вещественный анализ, 9 — комплексный анализ, 10 — численные методы,
/// 11 — дифференциальные уравнения, 12 — физика, 13 — науки и инженерия,
/// 14 — компьютеры, 15 — вероятность, 16 — статистика, 17 — история и общее.
/// Индекс — двузначный номер класса верхнего уровня, 0 — нет семейства.
#[rustfmt::skip]
const SUBJECT_FAMILIES: [u8; 100] = [
    //  0   1   2   3   4   5   6   7   8   9
       17, 17,  0,  1,  0,  2,  2,  0,  1,  0,  // 00
        0,  3,  4,  4,  4,  4,  4,  4,  1,  4,  // 10
        4,  0,  4,  0,  0,  0,  8,  0,  8,  0,  // 20
        9,  9,  9,  8, 11, 11,  0, 11,  0,  8,  // 30
        8, 10,  7,  7,  7, 11,  7,  7,  0, 11,  // 40
        0,  5,  5,  5,  6,  6,  0,  6, 11,  0,  // 50
       15,  0, 16,  0,  0, 10,  0,  0, 14,  0,  // 60
       12,  0,  0,  0, 12,  0, 12,  0, 12,  0,  // 70
       12, 12, 12, 12,  0, 12, 12,  0,  0,  0,  // 80
       10, 12, 13, 13, 14,  0,  0, 17,  0,  0,  // 90
];

/// Тематическое семейство класса по цифрам `code[3..5]` (`MSC05-XX` → 2)
#[must_use]
pub fn subject_family(code: &str) -> Option<u8> {
    let number: usize = code.get(3..5)?.parse().ok()?;
    SUBJECT_FAMILIES
        .get(number)
        .copied()
        .filter(|&family| family != 0)
}
