//! Input collaborators: table reader, edge readers, node index, link
//! table, event log reader and transaction tables.

pub mod edges;
pub mod events;
pub mod links;
pub mod nodes;
pub mod reader;
pub mod transactions;

pub use edges::{BinaryEdgeReader, EdgeInput, EdgeSource, TextEdgeReader, BINARY_RECORD_SIZE};
pub use events::EventLogReader;
pub use links::read_links;
pub use nodes::NodeIndex;
pub use reader::{TableError, TableReader};
pub use transactions::{TxRow, TxSide, TxTableReader, TxTimeReader};
