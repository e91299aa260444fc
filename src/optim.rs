use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PinnError;

/// 学習に使うオプティマイザの種類。
///
/// 設定時に一度だけ文字列から解決し、学習ループは具体的な burn のオプティマイザ型で
/// インスタンス化されます (`training::train`)。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerKind {
    Adam,
    RmsProp,
    Sgd,
}

impl OptimizerKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Adam => "Adam",
            Self::RmsProp => "RMSprop",
            Self::Sgd => "SGD",
        }
    }
}

impl FromStr for OptimizerKind {
    type Err = PinnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "adam" => Ok(Self::Adam),
            "rmsprop" => Ok(Self::RmsProp),
            "sgd" => Ok(Self::Sgd),
            _ => Err(PinnError::UnsupportedOptimizer(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_names_parse_case_insensitively() {
        assert_eq!("Adam".parse::<OptimizerKind>().unwrap(), OptimizerKind::Adam);
        assert_eq!("RMSprop".parse::<OptimizerKind>().unwrap(), OptimizerKind::RmsProp);
        assert_eq!("sgd".parse::<OptimizerKind>().unwrap(), OptimizerKind::Sgd);
    }

    #[test]
    fn unknown_name_is_unsupported() {
        let err = "LBFGS".parse::<OptimizerKind>().unwrap_err();
        assert!(matches!(err, PinnError::UnsupportedOptimizer(name) if name == "LBFGS"));
    }
}
