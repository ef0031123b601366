pub mod myers;

pub use myers::edit_distance;
