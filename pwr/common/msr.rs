use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{PwrError, Result};

/// Raw register access seam. The engine only ever moves whole 8-byte
/// words through this interface; interpretation lives in `pwr-raw`.
pub trait MsrIo: Send + Sync {
    fn read(&self, core: u32, msr: u64) -> Result<u64>;
    fn write(&self, core: u32, msr: u64, value: u64) -> Result<()>;
}

pub struct MsrHandle {
    file: Mutex<File>,
    core_id: u32,
}

impl MsrHandle {
    pub fn new(path: &Path, core: u32) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| classify_open_error(path, core, e))?;

        tracing::debug!("Opened MSR device {} for core {}", path.display(), core);

        Ok(Self {
            file: Mutex::new(file),
            core_id: core,
        })
    }

    pub fn read(&self, msr: u64) -> Result<u64> {
        let mut file = self.file.lock();

        file.seek(SeekFrom::Start(msr)).map_err(|e| PwrError::Msr {
            core: self.core_id,
            msr,
            op: "seek",
            source: e,
        })?;

        let mut buffer = [0u8; 8];
        file.read_exact(&mut buffer).map_err(|e| PwrError::Msr {
            core: self.core_id,
            msr,
            op: "read",
            source: e,
        })?;

        let value = u64::from_le_bytes(buffer);
        tracing::debug!(
            "MSR read: core {} MSR 0x{:08x} = 0x{:016x}",
            self.core_id,
            msr,
            value
        );
        Ok(value)
    }

    pub fn write(&self, msr: u64, value: u64) -> Result<()> {
        let mut file = self.file.lock();

        file.seek(SeekFrom::Start(msr)).map_err(|e| PwrError::Msr {
            core: self.core_id,
            msr,
            op: "seek",
            source: e,
        })?;

        file.write_all(&value.to_le_bytes())
            .map_err(|e| PwrError::Msr {
                core: self.core_id,
                msr,
                op: "write",
                source: e,
            })?;

        tracing::debug!(
            "MSR write: core {} MSR 0x{:08x} = 0x{:016x}",
            self.core_id,
            msr,
            value
        );
        Ok(())
    }

    pub fn core_id(&self) -> u32 {
        self.core_id
    }
}

fn classify_open_error(path: &Path, core: u32, err: std::io::Error) -> PwrError {
    match err.kind() {
        ErrorKind::PermissionDenied => {
            PwrError::MsrPermissionDenied(format!("{} (core {core})", path.display()))
        }
        ErrorKind::NotFound => {
            PwrError::MsrDriverNotLoaded(format!("{} (core {core})", path.display()))
        }
        _ => PwrError::Msr {
            core,
            msr: 0,
            op: "open",
            source: err,
        },
    }
}

/// Pool of per-core MSR device handles. Owned by the `System` that
/// created it; there is no process-wide instance.
pub struct Msr {
    msr_root: PathBuf,
    handles: RwLock<HashMap<u32, Arc<MsrHandle>>>,
}

impl Msr {
    pub fn new(msr_root: PathBuf) -> Self {
        Self {
            msr_root,
            handles: RwLock::new(HashMap::new()),
        }
    }

    fn get_handle(&self, core: u32) -> Result<Arc<MsrHandle>> {
        {
            let handles = self.handles.read();
            if let Some(handle) = handles.get(&core) {
                return Ok(Arc::clone(handle));
            }
        }

        let mut handles = self.handles.write();
        if let Some(handle) = handles.get(&core) {
            return Ok(Arc::clone(handle));
        }

        let path = self.msr_root.join(core.to_string()).join("msr");
        let handle = Arc::new(MsrHandle::new(&path, core)?);
        handles.insert(core, Arc::clone(&handle));
        Ok(handle)
    }
}

impl MsrIo for Msr {
    fn read(&self, core: u32, msr: u64) -> Result<u64> {
        self.get_handle(core)?.read(msr)
    }

    fn write(&self, core: u32, msr: u64, value: u64) -> Result<()> {
        self.get_handle(core)?.write(msr, value)
    }
}
