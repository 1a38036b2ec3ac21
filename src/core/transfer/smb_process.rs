use std::net::Ipv4Addr;
use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{TransferClient, TransferError};
use crate::config::ShareConfig;

/// Transfer client that shells out to `smbclient` for each file.
pub struct SmbProcessClient {
    share: ShareConfig,
}

impl SmbProcessClient {
    pub fn new(share: ShareConfig) -> Self {
        Self { share }
    }

    fn auth_arg(&self) -> String {
        if self.share.domain.is_empty() {
            format!("{}%{}", self.share.username, self.share.secret)
        } else {
            format!(
                "{}\\{}%{}",
                self.share.domain, self.share.username, self.share.secret
            )
        }
    }

    fn put_command(&self, remote_name: &str, source: &Path) -> String {
        if self.share.remote_dir.is_empty() {
            format!("put \"{}\" \"{}\"", source.display(), remote_name)
        } else {
            format!(
                "cd \"{}\"; put \"{}\" \"{}\"",
                self.share.remote_dir,
                source.display(),
                remote_name
            )
        }
    }
}

#[async_trait]
impl TransferClient for SmbProcessClient {
    async fn upload(
        &self,
        address: Ipv4Addr,
        remote_name: &str,
        source: &Path,
    ) -> Result<(), TransferError> {
        let service = format!("//{}/{}", address, self.share.share_name);

        let output = Command::new("smbclient")
            .arg(&service)
            .arg("-U")
            .arg(self.auth_arg())
            .arg("-c")
            .arg(self.put_command(remote_name, source))
            .output()
            .await
            .map_err(TransferError::Spawn)?;

        if output.status.success() {
            debug!(%address, file = remote_name, "smb upload successful");
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(TransferError::Rejected(stderr.trim().to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn share(domain: &str, remote_dir: &str) -> ShareConfig {
        ShareConfig {
            share_name: "backups".into(),
            username: "navi".into(),
            secret: "hunter2".into(),
            domain: domain.into(),
            remote_dir: remote_dir.into(),
        }
    }

    #[test]
    fn auth_arg_omits_empty_domain() {
        let client = SmbProcessClient::new(share("", ""));
        assert_eq!(client.auth_arg(), "navi%hunter2");

        let client = SmbProcessClient::new(share("WORKGROUP", ""));
        assert_eq!(client.auth_arg(), "WORKGROUP\\navi%hunter2");
    }

    #[test]
    fn put_command_includes_remote_dir_when_set() {
        let client = SmbProcessClient::new(share("", "phone"));
        let cmd = client.put_command("a.jpg", Path::new("/tmp/a.jpg"));
        assert_eq!(cmd, "cd \"phone\"; put \"/tmp/a.jpg\" \"a.jpg\"");

        let client = SmbProcessClient::new(share("", ""));
        let cmd = client.put_command("a.jpg", Path::new("/tmp/a.jpg"));
        assert_eq!(cmd, "put \"/tmp/a.jpg\" \"a.jpg\"");
    }
}
