mod export;
mod keyboard;
mod live_search;

pub use export::{export_m3u, ExportError, PlaylistExport, PLAYLIST_MIME};
pub use keyboard::{KeyInput, NavAction, NavigatorMode, SearchNavigator};
pub use live_search::{BpmBucket, LiveSearch, SearchFilters, DEBOUNCE, RESULT_CAP};
