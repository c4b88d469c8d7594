pub mod camera;
pub mod config;
pub mod dataset;
pub mod depth;
pub mod detector;
pub mod frame;
pub mod image;
pub mod my_types;
pub mod optical_flow;
pub mod pipeline;
pub mod pyramid;
pub mod track;
pub mod tracker;
pub mod visualization;
