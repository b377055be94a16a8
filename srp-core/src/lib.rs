#![forbid(unsafe_code)]

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod error;

pub mod codec;

pub mod sparse {
    pub mod csc;
    pub mod csr;
}

pub mod container {
    pub mod archive;
    pub mod chunktab;
    pub mod metadata;
    pub mod variants;
}

pub mod store {
    pub mod cache;
    pub mod chunks;
}

pub mod ingest {
    pub mod pipeline;
    pub mod plan;
    pub mod upstream;
}

pub mod select;

pub mod panel;

pub use crate::error::{PanelError, Result};

pub use crate::panel::{ConvertOptions, DosageBlock, SparseRefPanel};

pub use crate::select::{ColSelector, RowSelector};

pub use crate::sparse::csc::CscMatrix;
pub use crate::sparse::csr::CsrMatrix;

pub mod prelude {
    pub use crate::error::{PanelError, Result};
    pub use crate::ingest::upstream::{BcfTool, UpstreamTool, XsiTool};
    pub use crate::panel::{ConvertOptions, DosageBlock, SparseRefPanel};
    pub use crate::select::{ColSelector, RowSelector};
    pub use crate::sparse::csc::CscMatrix;
}
