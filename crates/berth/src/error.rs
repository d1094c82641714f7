use crate::engine::CommandError;

#[derive(Debug, thiserror::Error)]
pub enum BerthError {
    #[error("config error: {0}")]
    Config(String),

    #[error("build error: {0}")]
    Build(String),

    #[error("engine error: {0}")]
    Engine(#[from] CommandError),

    #[error("launch environment: {0}")]
    Env(#[from] berth_common::EnvError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type BerthResult<T> = Result<T, BerthError>;
