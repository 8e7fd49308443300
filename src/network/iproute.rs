//! iproute2-backed network control
//!
//! Runs the `ip` binary for every primitive. Each invocation is bounded by a
//! timeout; a command still running when it expires is killed.
//! Namespace handles are symlinks in the netns run directory, which is where
//! `ip -n <name>` looks names up.

use crate::error::{Error, Result};
use crate::network::control::{InterfaceAddress, NetworkControl};
use ipnet::{IpNet, Ipv6Net};
use serde::Deserialize;
use std::io::{self, Read};
use std::net::{IpAddr, Ipv6Addr};
use std::path::{Component, Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Interval between polls of a running command
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One entry of `ip -j address show`
#[derive(Debug, Deserialize)]
struct LinkAddresses {
    ifname: String,
    #[serde(default)]
    addr_info: Vec<AddrInfo>,
}

#[derive(Debug, Deserialize)]
struct AddrInfo {
    family: String,
    local: String,
    prefixlen: u8,
}

/// One entry of `ip -j link show`
#[derive(Debug, Deserialize)]
struct LinkInfo {
    address: Option<String>,
}

/// Network control through the iproute2 `ip` command
#[derive(Debug, Clone)]
pub struct IpRoute2 {
    binary: PathBuf,
    netns_dir: PathBuf,
    timeout: Duration,
}

impl IpRoute2 {
    pub fn new(binary: impl Into<PathBuf>, netns_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            netns_dir: netns_dir.into(),
            timeout,
        }
    }

    /// Handle file for a container, always directly inside `netns_dir`
    fn handle_path(&self, container_id: &str) -> Result<PathBuf> {
        let mut components = Path::new(container_id).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) => Ok(self.netns_dir.join(name)),
            _ => Err(Error::InvalidRequest(format!(
                "Container ID '{}' is not a plain file name",
                container_id
            ))),
        }
    }

    /// Run `ip` with `args`, optionally inside a namespace, returning stdout
    fn ip(&self, namespace: Option<&str>, args: &[&str]) -> Result<String> {
        let mut full: Vec<&str> = Vec::with_capacity(args.len() + 2);
        if let Some(ns) = namespace {
            full.extend(["-n", ns]);
        }
        full.extend_from_slice(args);

        let command = format!("{} {}", self.binary.display(), full.join(" "));
        tracing::debug!(command = %command, "running");

        let child = Command::new(&self.binary)
            .args(&full)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::CommandFailed {
                command: command.clone(),
                message: e.to_string(),
            })?;

        let output = self.wait(child, &command)?;
        if !output.success {
            return Err(Error::CommandFailed {
                command,
                message: output.stderr.trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    /// Wait for a child with timeout enforcement
    fn wait(&self, mut child: Child, command: &str) -> Result<CommandOutput> {
        // Drain pipes concurrently so a chatty command cannot block on a full pipe
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let start = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if start.elapsed() > self.timeout {
                        let _ = child.kill();
                        // Reap after kill
                        let _ = child.wait();
                        return Err(Error::CommandTimeout {
                            command: command.to_string(),
                            seconds: self.timeout.as_secs(),
                        });
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    return Err(Error::CommandFailed {
                        command: command.to_string(),
                        message: format!("Failed to wait on process: {}", e),
                    });
                }
            }
        };

        Ok(CommandOutput {
            success: status.success(),
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        })
    }
}

struct CommandOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut buf);
        }
        buf
    })
}

/// Parse `ip -j address show` output
fn parse_addresses(json: &str) -> Result<Vec<InterfaceAddress>> {
    let links: Vec<LinkAddresses> = serde_json::from_str(json)?;
    let mut addresses = Vec::new();

    for link in links {
        for info in link.addr_info {
            if info.family != "inet" && info.family != "inet6" {
                continue;
            }
            let addr: IpAddr = info
                .local
                .parse()
                .map_err(|e| Error::Discovery(format!("bad address '{}': {}", info.local, e)))?;
            let net = IpNet::new(addr, info.prefixlen)
                .map_err(|e| Error::Discovery(format!("bad prefix on {}: {}", info.local, e)))?;
            addresses.push(InterfaceAddress::new(link.ifname.clone(), net));
        }
    }

    Ok(addresses)
}

/// Parse the hardware address out of `ip -j link show dev NAME`
fn parse_hardware_address(json: &str, name: &str) -> Result<String> {
    let links: Vec<LinkInfo> = serde_json::from_str(json)?;
    links
        .into_iter()
        .next()
        .and_then(|l| l.address)
        .ok_or_else(|| Error::InterfaceNotFound(name.to_string()))
}

impl NetworkControl for IpRoute2 {
    fn list_interface_addresses(&self) -> Result<Vec<InterfaceAddress>> {
        let json = self.ip(None, &["-j", "address", "show"])?;
        parse_addresses(&json)
    }

    fn create_veth_pair(&self, host: &str, peer: &str) -> Result<()> {
        self.ip(None, &["link", "add", host, "type", "veth", "peer", "name", peer])
            .map(drop)
    }

    fn delete_link(&self, name: &str) -> Result<()> {
        self.ip(None, &["link", "delete", name]).map(drop)
    }

    fn hardware_address(&self, name: &str) -> Result<String> {
        let json = self.ip(None, &["-j", "link", "show", "dev", name])?;
        parse_hardware_address(&json, name)
    }

    fn link_exists(&self, name: &str) -> Result<bool> {
        let json = self.ip(None, &["-j", "link", "show"])?;
        let links: Vec<LinkAddresses> = serde_json::from_str(&json)?;
        Ok(links.iter().any(|l| l.ifname == name))
    }

    fn move_link_to_namespace(&self, link: &str, namespace: &str) -> Result<()> {
        self.ip(None, &["link", "set", link, "netns", namespace]).map(drop)
    }

    fn rename_link(&self, old: &str, new: &str, namespace: Option<&str>) -> Result<()> {
        self.ip(namespace, &["link", "set", old, "name", new]).map(drop)
    }

    fn set_link_up(&self, name: &str, namespace: Option<&str>) -> Result<()> {
        self.ip(namespace, &["link", "set", name, "up"]).map(drop)
    }

    fn assign_address(&self, name: &str, address: Ipv6Net, namespace: Option<&str>) -> Result<()> {
        let address = address.to_string();
        self.ip(namespace, &["-6", "address", "add", &address, "dev", name])
            .map(drop)
    }

    fn add_default_route(&self, gateway: Ipv6Addr, via: &str, namespace: Option<&str>) -> Result<()> {
        let gateway = gateway.to_string();
        self.ip(
            namespace,
            &["-6", "route", "add", "default", "via", &gateway, "dev", via],
        )
        .map(drop)
    }

    fn bind_namespace_handle(&self, container_id: &str, path: &Path) -> Result<()> {
        let handle = self.handle_path(container_id)?;
        std::fs::create_dir_all(&self.netns_dir)?;
        std::os::unix::fs::symlink(path, &handle).map_err(|e| Error::CommandFailed {
            command: format!("symlink {} -> {}", handle.display(), path.display()),
            message: e.to_string(),
        })
    }

    fn unbind_namespace_handle(&self, container_id: &str) -> Result<()> {
        match std::fs::remove_file(self.handle_path(container_id)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(Error::InvalidRequest(format!("no namespace handle for '{}'", container_id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn namespace_handle_exists(&self, container_id: &str) -> Result<bool> {
        // symlink_metadata so a dangling handle still counts
        Ok(std::fs::symlink_metadata(self.handle_path(container_id)?).is_ok())
    }
}
