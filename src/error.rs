use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("camera error: {0}")]
    Camera(#[from] nokhwa::NokhwaError),

    #[error("inference error: {0}")]
    Inference(#[from] ort::OrtError),

    #[error("unexpected tensor shape: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("failed to read detector anchors: {0}")]
    Anchors(#[from] ndarray_npy::ReadNpyError),

    #[error("model produced no output at index {0}")]
    MissingOutput(usize),

    /// The detector returned fewer points than its topology promises.
    #[error("landmark set has {actual} points, topology requires {required}")]
    LandmarkTopology { required: usize, actual: usize },

    #[error("notification socket error: {0}")]
    Notify(#[from] nng::Error),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Errors that mean the landmark contract is broken and the session cannot go on.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::LandmarkTopology { .. })
    }
}
