mod stacked_array;

pub use stacked_array::DuplexArray;
