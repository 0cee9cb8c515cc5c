mod heap_file;
mod heap_iterator;

pub use heap_file::HeapFile;
pub use heap_iterator::HeapFileIterator;
