//! Result export

pub mod json;

pub use json::{
    activations_path_for, output_path_for, read_track_json, write_activations_json,
    write_track_json, ActivationsJson,
};
