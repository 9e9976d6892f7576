//! Scripted probe client: joins the lobby, chats, and prints everything the
//! server sends until the connection closes. Handy for eyeballing a running
//! server without a real client.

use shared::{decode_body, encode_frame, Message};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn send(stream: &mut TcpStream, msg: &Message) -> Result<(), Box<dyn std::error::Error>> {
    let frame = encode_frame(msg)?;
    stream.write_all(&frame).await?;
    Ok(())
}

async fn recv(stream: &mut TcpStream) -> Result<Message, Box<dyn std::error::Error>> {
    let mut prefix = [0u8; 4];
    stream.read_exact(&mut prefix).await?;
    let len = u32::from_be_bytes(prefix) as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;
    Ok(decode_body(&body)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:9001".to_string());
    let name = std::env::args()
        .nth(2)
        .unwrap_or_else(|| "probe".to_string());

    let mut stream = TcpStream::connect(&addr).await?;
    println!("Connected to {}", addr);

    send(&mut stream, &Message::Init { name: name.clone() }).await?;

    let info = recv(&mut stream).await?;
    println!("<- {:?}", info);
    if let Message::GameInfo { your_id, .. } = info {
        println!("Joined as session {} ({:?})", your_id, name);
    }

    send(
        &mut stream,
        &Message::Chat {
            player_id: 0, // the server stamps the real id
            text: format!("{} is watching", name),
        },
    )
    .await?;

    loop {
        match recv(&mut stream).await {
            Ok(msg) => println!("<- {:?}", msg),
            Err(err) => {
                println!("Connection closed: {}", err);
                break;
            }
        }
    }

    Ok(())
}
