// faultline — tail-latency hazard analyzer
//
// Library root. The analysis core: cache-line layout model, thread-escape
// model, hot-path oracle, the fifteen rule detectors, the lowered-IR profile
// builder and diagnostic refiner, the bounded-parallel IR driver, the
// hypothesis/interaction model, and the calibration gate.

pub mod calibrate;
pub mod config;
pub mod diag;
pub mod driver;
pub mod engine;
pub mod escape;
pub mod hotpath;
pub mod interact;
pub mod irmodel;
pub mod irprofile;
pub mod layout;
pub mod output;
pub mod refine;
pub mod rules;
pub mod tu;
