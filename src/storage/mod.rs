pub mod slotted_page;
pub mod table_heap;

pub use slotted_page::SlottedPage;
pub use table_heap::{TableHeap, TableIterator};
