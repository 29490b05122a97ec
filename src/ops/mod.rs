pub mod sync;
pub mod todo_ops;
