/*!
 * Replica ACK Client
 *
 * Minimal replica side of the replication handshake: connect to a master,
 * announce `REPLCONF ACK 0`, and repeat the ACK whenever the master sends a
 * line containing `GETACK`. No data is replicated.
 */

use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::thread::JoinHandle;

/// `REPLCONF ACK 0` as a RESP array
pub const REPLCONF_ACK: &[u8] = b"*3\r\n$8\r\nREPLCONF\r\n$3\r\nACK\r\n$1\r\n0\r\n";

/// Spawn a thread that runs the ACK loop against `master` (`host:port`)
pub fn spawn_ack_client(master: String) -> Result<JoinHandle<()>> {
    let handle = std::thread::Builder::new()
        .name("replica-ack".into())
        .spawn(move || {
            if let Err(e) = connect_and_ack(&master) {
                log::warn!("replication error: {:#}", e);
            }
        })?;
    Ok(handle)
}

fn connect_and_ack(master: &str) -> Result<()> {
    let stream = TcpStream::connect(master)
        .with_context(|| format!("cannot connect to master {}", master))?;
    log::info!("connected to master {}", master);
    let writer = stream.try_clone()?;
    let acks = run_ack_loop(stream, writer)?;
    log::info!("master {} closed the link after {} acks", master, acks);
    Ok(())
}

/// Send the initial ACK, then answer every `GETACK` line until EOF
///
/// Returns the total number of ACK frames written.
pub fn run_ack_loop<R: Read, W: Write>(reader: R, mut writer: W) -> Result<usize> {
    writer.write_all(REPLCONF_ACK)?;
    writer.flush()?;
    let mut acks = 1;

    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(acks);
        }
        if line.windows(6).any(|w| w == b"GETACK") {
            writer.write_all(REPLCONF_ACK)?;
            writer.flush()?;
            acks += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acks_once_per_getack_line() {
        let input: &[u8] = b"*3\r\n$8\r\nREPLCONF\r\n$6\r\nGETACK\r\n$1\r\n*\r\nPING\r\nGETACK\n";
        let mut out = Vec::new();
        let acks = run_ack_loop(input, &mut out).unwrap();
        assert_eq!(acks, 3);
        assert_eq!(out, REPLCONF_ACK.repeat(3));
    }

    #[test]
    fn silent_master_gets_initial_ack_only() {
        let mut out = Vec::new();
        assert_eq!(run_ack_loop(&b""[..], &mut out).unwrap(), 1);
        assert_eq!(out, REPLCONF_ACK);
    }
}
