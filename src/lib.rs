//! Differentially private gradient-boosted decision trees for regression
//! and binary/multiclass classification on dense tabular data.
//!
//! The crate is organized leaf-first, mirroring the modules it is built
//! from: [`noise`] (DP primitives), [`loss`] (the loss-function
//! abstraction), [`tree`] (single-tree construction), [`boosting`] (the
//! ensemble training loop), and [`predict`] (raw-score aggregation and
//! label/probability mapping). [`config`] validates the parameter bundle
//! every fit takes, and [`serialize`] gives the trained [`Ensemble`] a
//! stable binary form.
//!
//! ```ignore
//! use dp_gbdt::{config::DpGbdtConfig, data::Matrix, fit, predict};
//!
//! let x = Matrix::from_rows(vec![0.0, 1.0, 2.0, 3.0], 4, 1);
//! let y = vec![0.0, 1.0, 2.0, 3.0];
//! let cfg = DpGbdtConfig::builder()
//!     .privacy_budget(1.0)
//!     .nb_trees(10)
//!     .seed(0)
//!     .build(1)?;
//! let ensemble = fit(&x, &y, &cfg, None)?;
//! let preds = predict(&ensemble, &x)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod boosting;
pub mod config;
pub mod data;
pub mod errors;
pub mod loss;
pub mod noise;
pub mod predict;
pub mod rng;
pub mod serialize;
pub mod tree;

pub use boosting::{fit, Ensemble};
pub use config::{DpGbdtConfig, DpGbdtConfigBuilder};
pub use data::{FeatureKind, FeatureKinds, Matrix};
pub use errors::{ConfigError, FitError, PredictError};
pub use loss::Loss;
pub use predict::{predict, predict_proba, predict_raw};
