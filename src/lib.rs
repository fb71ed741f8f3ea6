pub mod actions;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod feed;
pub mod gestures;
pub mod input;
pub mod ipc;
pub mod landmarks;
pub mod logging;
pub mod pointer;
pub mod scene;
pub mod session;
