//! 实验结果日志（JSON lines，只追加）

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::mab::Action;
use crate::net::DeviceId;

#[derive(Debug, thiserror::Error)]
pub enum ResultLogError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write result record: {0}")]
    Write(#[from] std::io::Error),
    #[error("failed to encode result record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// 结果日志中的一条记录
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultRecord<'a> {
    Start {
        policy: String,
        ingress: DeviceId,
        candidates: &'a [DeviceId],
    },
    ColdStart {
        actions: &'a [Action],
    },
    Round {
        round: u32,
        /// 整轮都没有有效奖励时为 null
        mean_reward: Option<f64>,
        elapsed_ms: u64,
    },
    Final {
        actions: &'a [Action],
    },
}

#[derive(Debug)]
pub struct ResultLog {
    out: BufWriter<File>,
}

impl ResultLog {
    pub fn open(path: &Path) -> Result<Self, ResultLogError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| ResultLogError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            out: BufWriter::new(file),
        })
    }

    /// 写一条记录并立即落盘
    pub fn append(&mut self, record: &ResultRecord<'_>) -> Result<(), ResultLogError> {
        serde_json::to_writer(&mut self.out, record)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}
