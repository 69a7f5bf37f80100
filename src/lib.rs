pub mod boundary;
pub mod coloring;
pub mod config;
pub mod error;
pub mod field;
pub mod labels;
pub mod osm;
pub mod pipeline;
pub mod polygon;
pub mod source;

pub use boundary::{Boundaries, Coord, extract_boundaries};
pub use coloring::{RegionColoring, build_adjacency_graph, color_graph, subject_family};
pub use config::{AssemblySettings, LabelingStrategy, MapGenerationParams, SearchMode};
pub use error::MapError;
pub use field::{GridExportLevel, OwnershipGrid, build_influence_field};
pub use labels::{LabelGrid, label_water};
pub use osm::{GeometryWriter, NodeRef, OsmWriter};
pub use pipeline::{GeneratedMap, MapSummary, generate_map};
pub use polygon::{Polygon, PolygonAssembler, PolygonKind};
pub use source::loader::load_catalog;
pub use source::{Level, Source, SourceCatalog, SourceId};
