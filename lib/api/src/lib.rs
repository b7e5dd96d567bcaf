//! REST surface for fraudx.
//!
//! | method | path | |
//! |---|---|---|
//! | `POST` | `/evaluate` | screen an application, returns a decision |
//! | `PUT` | `/cases` | embed and store a labeled case |
//! | `GET` | `/schema` | the serving model configuration |
//! | `GET` | `/health` | readiness and case count |
//! | `POST` | `/model/reload` | publish the saved model artifact |

pub mod rest;

pub use rest::{ApiError, AppState, RestApi};
