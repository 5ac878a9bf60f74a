//! Socket plumbing: the machine list file and pairwise rank links.

use crate::core::error::{HistGbmError, Result};
use crossbeam_channel::bounded;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::time::Duration;

/// Connect attempts before a peer is declared unreachable.
const CONNECT_RETRY_COUNT: usize = 20;
/// Delay between connect attempts.
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Parsed machine list: one `(ip, port)` per rank.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineList {
    /// Host addresses in rank order.
    pub ips: Vec<String>,
    /// Listen ports in rank order.
    pub ports: Vec<u16>,
    /// Rank pinned by a `rank=N` line, if any.
    pub rank_override: Option<i32>,
}

impl MachineList {
    /// Parse the machine list file. Lines are `ip port` or `rank=N`;
    /// unrecognized lines are skipped, machines beyond `num_machines` are
    /// dropped with a warning.
    pub fn parse<P: AsRef<Path>>(path: P, num_machines: i32) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            HistGbmError::config(format!(
                "machine list file {} cannot be read: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let mut list = MachineList {
            ips: Vec::new(),
            ports: Vec::new(),
            rank_override: None,
        };
        for line in content.lines() {
            let line = line.trim();
            if let Some(value) = line.strip_prefix("rank=") {
                match value.trim().parse::<i32>() {
                    Ok(rank) => list.rank_override = Some(rank),
                    Err(_) => log::warn!("ignoring malformed rank line: '{}'", line),
                }
                continue;
            }
            let mut parts = line.split_whitespace();
            let (ip, port) = match (parts.next(), parts.next(), parts.next()) {
                (Some(ip), Some(port), None) => (ip, port),
                _ => continue,
            };
            let port: u16 = match port.parse() {
                Ok(p) => p,
                Err(_) => continue,
            };
            if list.ips.len() >= num_machines as usize {
                log::warn!(
                    "machine list holds more machines than num_machines = {}; \
                     the redundant ones are ignored",
                    num_machines
                );
                break;
            }
            list.ips.push(ip.to_string());
            list.ports.push(port);
        }
        if list.ips.is_empty() {
            return Err(HistGbmError::config(format!(
                "machine list file {} contains no machines",
                path.as_ref().display()
            )));
        }
        Ok(list)
    }

    /// Number of machines actually listed.
    pub fn len(&self) -> usize {
        self.ips.len()
    }

    /// True when no machine lines were found.
    pub fn is_empty(&self) -> bool {
        self.ips.is_empty()
    }

    /// Local rank: the pinned override, or the entry whose port matches
    /// the local listen port on a loopback/local address.
    pub fn local_rank(&self, local_listen_port: u16) -> Result<i32> {
        if let Some(rank) = self.rank_override {
            return Ok(rank);
        }
        for (i, (ip, &port)) in self.ips.iter().zip(self.ports.iter()).enumerate() {
            if port == local_listen_port && is_local_address(ip) {
                return Ok(i as i32);
            }
        }
        // fall back to a unique port match for multi-host lists
        let matches: Vec<usize> = self
            .ports
            .iter()
            .enumerate()
            .filter(|(_, &p)| p == local_listen_port)
            .map(|(i, _)| i)
            .collect();
        match matches.as_slice() {
            [only] => Ok(*only as i32),
            _ => Err(HistGbmError::network(
                "machine list file does not contain the local machine",
            )),
        }
    }
}

fn is_local_address(ip: &str) -> bool {
    matches!(ip, "127.0.0.1" | "localhost" | "0.0.0.0" | "::1")
}

/// Pairwise TCP links to every other rank, built from the machine list.
#[derive(Debug)]
pub struct Linkers {
    /// Local rank.
    pub rank: i32,
    /// World size.
    pub num_machines: i32,
    /// `links[r]` carries the connection to rank `r`; `None` for self.
    pub links: Vec<Option<TcpStream>>,
}

impl Linkers {
    /// Bind the local port, then connect the full peer set: smaller ranks
    /// dial larger ones, each sending its rank as a 4-byte handshake.
    pub fn construct(list: &MachineList, rank: i32, timeout: Duration) -> Result<Self> {
        let num_machines = list.len() as i32;
        let port = list.ports[rank as usize];
        let listener = TcpListener::bind(("0.0.0.0", port)).map_err(|e| {
            HistGbmError::network(format!("binding port {} failed: {}", port, e))
        })?;
        log::info!("binding port {} succeeded", port);

        let incoming_cnt = rank as usize;
        let (sender, receiver) = bounded::<(i32, TcpStream)>(num_machines as usize);
        let listen_thread = std::thread::spawn(move || -> Result<()> {
            for _ in 0..incoming_cnt {
                let (mut stream, _) = listener
                    .accept()
                    .map_err(|e| HistGbmError::network(format!("accept failed: {}", e)))?;
                let mut rank_bytes = [0u8; 4];
                stream
                    .read_exact(&mut rank_bytes)
                    .map_err(|e| HistGbmError::network(format!("rank handshake failed: {}", e)))?;
                let peer = i32::from_le_bytes(rank_bytes);
                sender
                    .send((peer, stream))
                    .map_err(|_| HistGbmError::network("listen channel closed"))?;
            }
            Ok(())
        });

        let mut links: Vec<Option<TcpStream>> = (0..num_machines).map(|_| None).collect();

        // dial every larger rank
        for peer in (rank + 1)..num_machines {
            let addr = (list.ips[peer as usize].as_str(), list.ports[peer as usize]);
            let mut stream = None;
            for attempt in 0..CONNECT_RETRY_COUNT {
                match TcpStream::connect(addr) {
                    Ok(s) => {
                        stream = Some(s);
                        break;
                    }
                    Err(e) => {
                        log::warn!(
                            "connect to rank {} failed ({}), retrying in {:?} \
                             (attempt {}/{})",
                            peer,
                            e,
                            CONNECT_RETRY_DELAY,
                            attempt + 1,
                            CONNECT_RETRY_COUNT
                        );
                        std::thread::sleep(CONNECT_RETRY_DELAY);
                    }
                }
            }
            let mut stream = stream.ok_or_else(|| {
                HistGbmError::network(format!(
                    "connect to rank {} failed after {} attempts",
                    peer, CONNECT_RETRY_COUNT
                ))
            })?;
            stream
                .write_all(&rank.to_le_bytes())
                .map_err(|e| HistGbmError::network(format!("rank handshake failed: {}", e)))?;
            configure_stream(&stream, timeout)?;
            links[peer as usize] = Some(stream);
        }

        // collect the smaller ranks that dialed us
        listen_thread
            .join()
            .map_err(|_| HistGbmError::network("listen thread panicked"))??;
        for (peer, stream) in receiver.try_iter() {
            if peer < 0 || peer >= num_machines {
                return Err(HistGbmError::network(format!(
                    "handshake carried invalid rank {}",
                    peer
                )));
            }
            configure_stream(&stream, timeout)?;
            links[peer as usize] = Some(stream);
        }

        for peer in 0..num_machines {
            if peer != rank && links[peer as usize].is_none() {
                return Err(HistGbmError::network(format!(
                    "no link established to rank {}",
                    peer
                )));
            }
            if links[peer as usize].is_some() {
                log::info!("connected to rank {}", peer);
            }
        }

        Ok(Linkers {
            rank,
            num_machines,
            links,
        })
    }
}

fn configure_stream(stream: &TcpStream, timeout: Duration) -> Result<()> {
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as IoWrite;

    #[test]
    fn test_machine_list_parse() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "127.0.0.1 12400").unwrap();
        writeln!(file, "# a comment line that is skipped").unwrap();
        writeln!(file, "127.0.0.1 12401").unwrap();
        writeln!(file, "not a machine").unwrap();
        writeln!(file, "127.0.0.1 12402").unwrap();
        let list = MachineList::parse(file.path(), 3).unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list.ports, vec![12400, 12401, 12402]);
        assert_eq!(list.rank_override, None);
    }

    #[test]
    fn test_machine_list_rank_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "rank=2").unwrap();
        writeln!(file, "10.0.0.1 5000").unwrap();
        writeln!(file, "10.0.0.2 5000").unwrap();
        writeln!(file, "10.0.0.3 5000").unwrap();
        let list = MachineList::parse(file.path(), 3).unwrap();
        assert_eq!(list.rank_override, Some(2));
        assert_eq!(list.local_rank(5000).unwrap(), 2);
    }

    #[test]
    fn test_machine_list_truncates_extras() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for port in 12400..12410 {
            writeln!(file, "127.0.0.1 {}", port).unwrap();
        }
        let list = MachineList::parse(file.path(), 4).unwrap();
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn test_local_rank_by_port() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "127.0.0.1 23401").unwrap();
        writeln!(file, "127.0.0.1 23402").unwrap();
        let list = MachineList::parse(file.path(), 2).unwrap();
        assert_eq!(list.local_rank(23402).unwrap(), 1);
        assert!(list.local_rank(9).is_err());
    }

    #[test]
    fn test_empty_machine_list_is_fatal() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "nothing useful here").unwrap();
        assert!(MachineList::parse(file.path(), 2).is_err());
    }
}
