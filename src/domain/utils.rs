pub mod emitter;
pub mod id;
