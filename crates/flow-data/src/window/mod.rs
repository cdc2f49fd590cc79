//! 프로그램 매매 메모리 창.

mod program_window;
mod ring_buffer;

pub use program_window::{
    ProgramWindowCache, ProgramWindowReader, DEFAULT_RING_CAPACITY, MAX_RING_CAPACITY,
    MIN_RING_CAPACITY,
};
pub use ring_buffer::RingBuffer;
