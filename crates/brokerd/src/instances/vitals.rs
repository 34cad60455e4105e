//! Liveness checks applied to peer records.

use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(250);

/// Answers whether the broker behind a record still runs.
#[cfg_attr(test, mockall::automock)]
pub trait PeerVitals: Send + Sync {
    /// Returns true when a process with `pid` exists.
    fn process_alive(&self, pid: u32) -> bool;

    /// Returns true when something accepts TCP connections on the loopback
    /// `port`.
    fn port_answers(&self, port: u16) -> bool;
}

/// Vitals backed by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemVitals;

impl PeerVitals for SystemVitals {
    fn process_alive(&self, pid: u32) -> bool {
        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        if raw <= 0 {
            return false;
        }
        match kill(Pid::from_raw(raw), None) {
            Ok(()) | Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    fn port_answers(&self, port: u16) -> bool {
        if port == 0 {
            return false;
        }
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use super::*;

    #[test]
    fn current_process_is_alive() {
        assert!(SystemVitals.process_alive(std::process::id()));
    }

    #[test]
    fn pid_zero_is_never_alive() {
        assert!(!SystemVitals.process_alive(0));
    }

    #[test]
    fn listening_port_answers_and_released_port_does_not() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind");
        let port = listener.local_addr().expect("addr").port();
        assert!(SystemVitals.port_answers(port));
        drop(listener);
        assert!(!SystemVitals.port_answers(port));
    }
}
