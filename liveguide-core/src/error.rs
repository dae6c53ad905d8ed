#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unexpected status: {0}")]
    UnexpectedStatus(reqwest::StatusCode),
    #[error("reqwest error: {0}")]
    ReqwestError(reqwest::Error),
    #[error("std::io error: {0}")]
    IoError(std::io::Error),
    #[error("YAML error: {0}")]
    YamlError(serde_yaml::Error),
    #[error("actlet error: {0}")]
    ActletError(actlet::Error),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::ReqwestError(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err)
    }
}

impl From<actlet::Error> for Error {
    fn from(err: actlet::Error) -> Self {
        Self::ActletError(err)
    }
}
