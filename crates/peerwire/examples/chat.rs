//! Minimal peer-to-peer chat over peerwire.
//!
//! Run two peers and point them at each other:
//! - cargo run -p peerwire --example chat -- 127.0.0.1:40001 127.0.0.1:40002
//! - cargo run -p peerwire --example chat -- 127.0.0.1:40002 127.0.0.1:40001
//!
//! Lines typed on stdin are sent to the destination as DATA; everything
//! received is printed. EOF (ctrl-d) shuts the peer down cleanly.

use std::{
    env,
    io::{self, BufRead},
    net::SocketAddr,
    process,
    time::Duration,
};

use peerwire::{client_id_for_ip, Peer, PeerEvent};

fn main() {
    let mut args = env::args().skip(1);
    let (bind_addr, dest_addr) = match (args.next(), args.next()) {
        (Some(bind), Some(dest)) => (bind, dest),
        _ => {
            eprintln!("Usage: chat <bind ip:port> <dest ip:port>");
            process::exit(1);
        }
    };

    let dest: SocketAddr = match dest_addr.parse() {
        Ok(addr) => addr,
        Err(err) => {
            eprintln!("Bad destination {}: {}", dest_addr, err);
            process::exit(1);
        }
    };

    if let Err(err) = run(&bind_addr, dest) {
        eprintln!("{}", err);
        process::exit(1);
    }
}

fn run(bind_addr: &str, dest: SocketAddr) -> peerwire::Result<()> {
    // Derive our client id from the bind address.
    let ip = bind_addr.rsplit_once(':').map(|(ip, _)| ip).unwrap_or(bind_addr);
    let client_id = client_id_for_ip(ip)?;

    let mut peer = Peer::new(bind_addr, &client_id)?;
    peer.listen(
        Duration::from_secs(5),
        Duration::from_secs(30),
        Some(Box::new(|remote, event| match event {
            PeerEvent::Connected => println!("[connect] {}", remote.owner_id()),
            PeerEvent::Disconnected => println!("[disconnect] {}", remote.owner_id()),
            PeerEvent::Latency(us) => println!("[latency] {} {}us", remote.owner_id(), us),
            PeerEvent::Data { payload, .. } => {
                println!("[{}] {}", remote.owner_id(), String::from_utf8_lossy(&payload));
            }
        })),
        Some(Box::new(|err| {
            eprintln!("[error] {}", err);
            false
        })),
    )?;

    println!("Listening on {} with client id {:02x?}", peer.local_addr()?, peer.client_id());
    println!("Type lines to send them to {}; ctrl-d quits.", dest);

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                eprintln!("[stdin] {}", err);
                break;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Err(err) = peer.send(dest, trimmed.as_bytes()) {
            eprintln!("[send] {}", err);
        }
    }

    println!("Shutting down");
    peer.close();
    Ok(())
}
