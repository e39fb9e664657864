use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::config::Stage;
use crate::error::{ParamsError, Result};
use crate::record::ParameterRecord;

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| ParamsError::io(path, e))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFile {
    pub stage: Stage,
    pub path: PathBuf,
    pub lines: usize,
}

/// Append-only parameters file of one stage. Created (truncating any previous
/// run's file) on open, so a stage that emits nothing still leaves an empty
/// file behind.
pub struct StageWriter {
    stage: Stage,
    path: PathBuf,
    out: BufWriter<File>,
    lines: usize,
}

impl StageWriter {
    pub fn open(dir: &Path, stage: Stage) -> Result<Self> {
        ensure_dir(dir)?;
        let path = dir.join(stage.file_name());
        let file = File::create(&path).map_err(|e| ParamsError::io(&path, e))?;
        info!(stage = %stage, path = %path.display(), "opened parameters file");
        Ok(Self {
            stage,
            path,
            out: BufWriter::new(file),
            lines: 0,
        })
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines(&self) -> usize {
        self.lines
    }

    pub fn append(&mut self, record: &ParameterRecord) -> Result<()> {
        writeln!(self.out, "{}", record.to_line()).map_err(|e| ParamsError::io(&self.path, e))?;
        self.lines += 1;
        Ok(())
    }

    pub fn close(self) -> Result<StageFile> {
        let StageWriter {
            stage,
            path,
            out,
            lines,
        } = self;
        let file = out
            .into_inner()
            .map_err(|e| ParamsError::io(&path, e.into_error()))?;
        file.sync_all().map_err(|e| ParamsError::io(&path, e))?;
        info!(stage = %stage, lines, path = %path.display(), "closed parameters file");
        Ok(StageFile { stage, path, lines })
    }
}

pub struct StageWriters {
    writers: BTreeMap<Stage, StageWriter>,
}

impl StageWriters {
    pub fn open(dir: &Path, stages: &[Stage]) -> Result<Self> {
        let mut writers = BTreeMap::new();
        for stage in stages {
            writers.insert(*stage, StageWriter::open(dir, *stage)?);
        }
        Ok(Self { writers })
    }

    pub fn is_open(&self, stage: Stage) -> bool {
        self.writers.contains_key(&stage)
    }

    pub fn append(&mut self, stage: Stage, record: &ParameterRecord) -> Result<()> {
        match self.writers.get_mut(&stage) {
            Some(writer) => writer.append(record),
            None => Ok(()),
        }
    }

    pub fn close(self) -> Result<Vec<StageFile>> {
        let mut files = Vec::with_capacity(self.writers.len());
        let mut first_err = None;
        for writer in self.writers.into_values() {
            match writer.close() {
                Ok(file) => files.push(file),
                Err(e) => {
                    error!(error = %e, "failed to close parameters file");
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(files),
        }
    }
}
