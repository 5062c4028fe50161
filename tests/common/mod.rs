#![allow(dead_code)]

use stack_bootstrap::command::mock::RecordingRunner;
use stack_bootstrap::command::CommandOutput;
use stack_bootstrap::config::{EnvFile, StackConfig};
use stack_bootstrap::transport::mock::ScriptedTransport;
use stack_bootstrap::transport::{Transport, TransportError};
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const CERTUTIL: &str = "bin/elasticsearch-certutil";

pub const CHALLENGE: &str = r#"{"error":{"root_cause":[{"type":"security_exception","reason":"missing authentication credentials for REST request [/]","header":{"WWW-Authenticate":["Basic realm=\"security\" charset=\"UTF-8\"","ApiKey"]}}],"type":"security_exception","reason":"missing authentication credentials for REST request [/]"},"status":401}"#;

pub const TOKEN: &str = "AAEAAWVsYXN0aWMva2liYW5hL3Rva2VuMTpHUUZLa";

/// Writes an env file into `dir` with both secrets, the certificate directory under
/// `dir`, the current user as certificate owner, and `extra` appended.
pub fn write_env(dir: &Path, extra: &str) -> PathBuf {
    let meta = fs::metadata(dir).unwrap();
    let path = dir.join(".env");
    let text = format!(
        "# Passwords\nELASTIC_PASSWORD=changeme\nKIBANA_PASSWORD=kibana-secret\n\n\
         CERTS_DIR={}\nCERTS_OWNER={}:{}\n\n# Filled in by provisioning\nELASTICSEARCH_SERVICE_TOKEN=\n{}",
        dir.join("certs").display(),
        meta.uid(),
        meta.gid(),
        extra
    );
    fs::write(&path, text).unwrap();
    path
}

pub fn load(path: &Path) -> (EnvFile, StackConfig) {
    let file = EnvFile::load(path).unwrap();
    let config = StackConfig::from_env_file(&file).unwrap();
    (file, config)
}

/// Stands in for the CA tool, `unzip` and the token tool. The CA tool writes a
/// placeholder archive at `-out`; `unzip` creates the files the real archive holds.
pub fn fake_tools() -> RecordingRunner {
    RecordingRunner::new(|inv| {
        if inv.program == CERTUTIL {
            let out = inv.flag_value("-out").expect("certutil without -out");
            fs::write(out, b"PK\x03\x04").unwrap();
            return CommandOutput::ok("");
        }
        match inv.program.as_str() {
            "unzip" => {
                let archive = Path::new(&inv.args[1]);
                let dest = Path::new(inv.flag_value("-d").expect("unzip without -d"));
                let files: &[&str] = match archive.file_name().and_then(|n| n.to_str()) {
                    Some("ca.zip") => &["ca/ca.crt", "ca/ca.key"],
                    _ => &["es01/es01.crt", "es01/es01.key"],
                };
                for file in files {
                    let path = dest.join(file);
                    fs::create_dir_all(path.parent().unwrap()).unwrap();
                    fs::write(path, "-----BEGIN-----\n").unwrap();
                }
                CommandOutput::ok("")
            }
            "docker" => CommandOutput::ok(format!(
                "SERVICE_TOKEN elastic/kibana/{} = {}\n",
                inv.args.last().unwrap(),
                TOKEN
            )),
            other => CommandOutput::failed(127, format!("{other}: not found")),
        }
    })
}

pub fn connector(
    transport: Arc<ScriptedTransport>,
) -> impl Fn(&StackConfig) -> Result<Arc<dyn Transport>, TransportError> + Send + Sync + 'static {
    move |_| {
        let transport: Arc<dyn Transport> = transport.clone();
        Ok(transport)
    }
}
