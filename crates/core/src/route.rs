//! Generation routes: the closed set of media generation modes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the four generation modes the downstream workflow understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    /// Text to image
    T2i,
    /// Image to image
    I2i,
    /// Multiple images to image
    M2i,
    /// Image to video
    I2v,
}

impl Route {
    pub const ALL: [Route; 4] = [Route::T2i, Route::I2i, Route::M2i, Route::I2v];

    /// Wire name, as sent to the model and the webhook.
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::T2i => "t2i",
            Route::I2i => "i2i",
            Route::M2i => "m2i",
            Route::I2v => "i2v",
        }
    }

    /// True only for the video route.
    pub fn is_video(&self) -> bool {
        matches!(self, Route::I2v)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown route '{0}', expected one of t2i, i2i, m2i, i2v")]
pub struct UnknownRoute(pub String);

impl FromStr for Route {
    type Err = UnknownRoute;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Route::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| UnknownRoute(s.to_string()))
    }
}
