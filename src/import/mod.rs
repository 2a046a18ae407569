mod parser;
mod pipeline;
mod rekordbox_xml;
mod tab_delimited;

pub use parser::{dedupe_by_title, parse_export, ExportFormat};
pub use pipeline::{BulkImportOutcome, ImportConfig, ImportOutcome, ImportPipeline};
pub use rekordbox_xml::parse_rekordbox_xml;
pub use tab_delimited::parse_tab_delimited;
