pub mod cloud;
pub mod config;
pub mod controllers;
pub mod current_loop;
pub mod drivers;
pub mod hardware;
pub mod http;
pub mod ids;
pub mod latest;
pub mod node;
pub mod ring_buffer;
pub mod scheduler;
pub mod sensor_config;
pub mod storage;
pub mod units;
