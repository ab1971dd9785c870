pub mod buffer_time;
pub mod debounce;
pub mod first;
pub mod join;
pub mod map;
pub mod map_async;
pub mod merge_all;
pub mod switch_on_next;
pub mod throttle_first_last;
pub mod zip;
pub mod zip_latest;
