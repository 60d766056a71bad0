use super::DigitalInput;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::io;
use std::path::{Path, PathBuf};

/// Digital input exported through the sysfs GPIO interface (`<root>/gpio<N>/value`).
pub struct SysfsDigitalInput {
    value_path: PathBuf,
}

impl SysfsDigitalInput {
    pub fn new(root: &Path, gpio: u32) -> Self {
        Self {
            value_path: root.join(format!("gpio{gpio}")).join("value"),
        }
    }
}

impl DigitalInput for SysfsDigitalInput {
    fn read(&self) -> BoxFuture<'_, io::Result<bool>> {
        async move {
            let raw = tokio::fs::read_to_string(&self.value_path).await?;
            match raw.trim() {
                "1" => Ok(true),
                "0" => Ok(false),
                other => Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unexpected gpio value '{other}' in {}", self.value_path.display()),
                )),
            }
        }
        .boxed()
    }
}
