//! Assembly of the outbound `ssh` argument vector.
//!
//! Host-key verification is always disabled: the jump pod is ephemeral and
//! its host key changes on every recreation. Clients from OpenSSH 8.5 on
//! additionally need the RSA/SHA-1 algorithms re-enabled to talk to the
//! older server images commonly used for the jump pod.

use std::{borrow::Cow, net::Ipv4Addr, path::PathBuf};

use crate::{consts, options::ConnectionOptions};

/// First OpenSSH release that disabled the ssh-rsa signature scheme.
fn rsa_compat_since() -> semver::Version { semver::Version::new(8, 5, 0) }

/// Access to the jump pod through the local forward.
#[derive(Clone, Debug)]
pub struct JumpGateway {
    /// Destination alias reserved for the jump pod itself.
    pub alias: String,
    /// Local port the forwarder listens on.
    pub local_port: u16,
    /// Private key authorized inside the pod.
    pub identity: PathBuf,
}

/// Where a session ends up.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Route {
    /// Straight into the jump pod, for maintenance of the pod itself.
    JumpPod,
    /// Through the jump pod onto a cluster node.
    Node { host: String, user: String, port: u16, identity: PathBuf },
}

/// The jump alias always resolves to the jump route; everything else is a
/// node reached with the caller's own identity.
pub fn resolve_route(destination: &str, gateway: &JumpGateway, options: &ConnectionOptions) -> Route {
    if destination == gateway.alias {
        Route::JumpPod
    } else {
        Route::Node {
            host: destination.to_string(),
            user: options.user.clone(),
            port: options.port,
            identity: options.identity.clone(),
        }
    }
}

/// Options applied to every connection touching the jump pod.
pub fn hardening_options() -> Vec<String> {
    ["-o", "StrictHostKeyChecking=no", "-o", "UserKnownHostsFile=/dev/null"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Legacy RSA compatibility options, required from OpenSSH 8.5 on.
pub fn compatibility_flags(client_version: &semver::Version) -> Vec<String> {
    if *client_version >= rsa_compat_since() {
        ["-o", "PubkeyAcceptedKeyTypes=+ssh-rsa", "-o", "HostKeyAlgorithms=+ssh-rsa"]
            .into_iter()
            .map(String::from)
            .collect()
    } else {
        Vec::new()
    }
}

/// Extracts the client version from an `ssh -V` banner such as
/// `OpenSSH_9.6p1 Ubuntu-3ubuntu13.4, OpenSSL 3.0.13 30 Jan 2024`.
pub fn parse_client_version(banner: &str) -> Option<semver::Version> {
    let start = banner.find("OpenSSH_")?;
    let rest = &banner[start + "OpenSSH_".len()..];
    let token =
        rest.chars().take_while(|c| c.is_ascii_digit() || *c == '.').collect::<String>();
    let mut parts = token.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().and_then(|part| part.parse().ok()).unwrap_or(0);
    let patch = parts.next().and_then(|part| part.parse().ok()).unwrap_or(0);
    Some(semver::Version::new(major, minor, patch))
}

/// Builds the argument vector for the interactive `ssh` invocation.
///
/// The node route tunnels through the jump pod with a `ProxyCommand` that
/// opens a raw `-W host:port` relay over an inner connection to the
/// forwarded local port; the jump route connects to that port directly.
pub fn build_args(route: &Route, gateway: &JumpGateway, extra_options: &[String]) -> Vec<String> {
    let mut args = hardening_options();
    args.extend_from_slice(extra_options);

    match route {
        Route::JumpPod => {
            args.extend([
                "-i".to_string(),
                gateway.identity.display().to_string(),
                "-p".to_string(),
                gateway.local_port.to_string(),
                format!("{}@{}", consts::JUMP_USER, Ipv4Addr::LOCALHOST),
            ]);
        }
        Route::Node { host, user, port, identity } => {
            args.extend([
                "-o".to_string(),
                format!("ProxyCommand={}", proxy_command(gateway, extra_options)),
                "-i".to_string(),
                identity.display().to_string(),
                "-p".to_string(),
                port.to_string(),
                format!("{user}@{host}"),
            ]);
        }
    }

    args
}

/// The inner hop: `ssh -W %h:%p` against the forwarded local port. The
/// string is executed by ssh through `sh`, hence the quoting.
fn proxy_command(gateway: &JumpGateway, extra_options: &[String]) -> String {
    let identity = shell_escape::escape(Cow::from(gateway.identity.display().to_string()));
    let mut parts = vec!["ssh".to_string(), "-q".to_string()];
    parts.extend(hardening_options());
    parts.extend_from_slice(extra_options);
    parts.extend([
        "-i".to_string(),
        identity.into_owned(),
        "-p".to_string(),
        gateway.local_port.to_string(),
        "-W".to_string(),
        "%h:%p".to_string(),
        format!("{}@{}", consts::JUMP_USER, Ipv4Addr::LOCALHOST),
    ]);
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{
        JumpGateway, Route, build_args, compatibility_flags, parse_client_version, resolve_route,
    };
    use crate::options::ConnectionOptions;

    fn gateway() -> JumpGateway {
        JumpGateway {
            alias: "sshjump".to_string(),
            local_port: 2222,
            identity: PathBuf::from("/data/jump_id"),
        }
    }

    fn options() -> ConnectionOptions {
        ConnectionOptions {
            user: "ec2-user".to_string(),
            identity: PathBuf::from("/home/op/.ssh/id_rsa"),
            pubkey: None,
            port: 22,
        }
    }

    #[test]
    fn test_jump_alias_resolves_to_jump_route() {
        assert_eq!(resolve_route("sshjump", &gateway(), &options()), Route::JumpPod);
    }

    #[test]
    fn test_other_destinations_resolve_to_node_route() {
        let route = resolve_route("worker-1", &gateway(), &options());
        assert_eq!(
            route,
            Route::Node {
                host: "worker-1".to_string(),
                user: "ec2-user".to_string(),
                port: 22,
                identity: PathBuf::from("/home/op/.ssh/id_rsa"),
            }
        );
    }

    #[test]
    fn test_compatibility_flags_version_gate() {
        assert!(compatibility_flags(&semver::Version::new(8, 4, 1)).is_empty());
        assert!(compatibility_flags(&semver::Version::new(7, 9, 0)).is_empty());

        let flags = compatibility_flags(&semver::Version::new(8, 5, 0));
        assert!(flags.contains(&"PubkeyAcceptedKeyTypes=+ssh-rsa".to_string()));
        assert!(flags.contains(&"HostKeyAlgorithms=+ssh-rsa".to_string()));
        assert!(!compatibility_flags(&semver::Version::new(9, 6, 0)).is_empty());
    }

    #[test]
    fn test_parse_client_version() {
        let banner = "OpenSSH_9.6p1 Ubuntu-3ubuntu13.4, OpenSSL 3.0.13 30 Jan 2024";
        assert_eq!(parse_client_version(banner), Some(semver::Version::new(9, 6, 0)));
        assert_eq!(
            parse_client_version("OpenSSH_8.5, OpenSSL 1.1.1"),
            Some(semver::Version::new(8, 5, 0))
        );
        assert_eq!(parse_client_version("no banner here"), None);
    }

    #[test]
    fn test_jump_route_args_use_root_and_jump_key() {
        let args = build_args(&Route::JumpPod, &gateway(), &[]);
        assert!(args.contains(&"root@127.0.0.1".to_string()));
        assert!(args.contains(&"/data/jump_id".to_string()));
        assert!(args.contains(&"2222".to_string()));
        assert!(!args.iter().any(|arg| arg.starts_with("ProxyCommand=")));
    }

    #[test]
    fn test_node_route_args_proxy_through_jump() {
        let route = resolve_route("worker-1", &gateway(), &options());
        let args = build_args(&route, &gateway(), &[]);

        assert!(args.contains(&"ec2-user@worker-1".to_string()));
        assert!(args.contains(&"/home/op/.ssh/id_rsa".to_string()));

        let proxy = args
            .iter()
            .find(|arg| arg.starts_with("ProxyCommand="))
            .expect("node route must carry a proxy command");
        assert!(proxy.contains("-W %h:%p"));
        assert!(proxy.contains("root@127.0.0.1"));
        assert!(proxy.contains("-p 2222"));
    }

    #[test]
    fn test_host_key_verification_always_disabled() {
        for route in [Route::JumpPod, resolve_route("worker-1", &gateway(), &options())] {
            let args = build_args(&route, &gateway(), &[]);
            assert!(args.contains(&"StrictHostKeyChecking=no".to_string()));
            assert!(args.contains(&"UserKnownHostsFile=/dev/null".to_string()));
        }
    }
}
