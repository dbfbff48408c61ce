pub mod artifact_store;
pub mod contours;
pub mod defect;
pub mod grid_histogram;
pub mod image_helper;
pub mod led_segmenter;
pub mod normalizer;
pub mod pattern_comparator;
pub mod pixel;
pub mod region;
