pub mod line_buffer;
pub mod message;
pub mod task;
