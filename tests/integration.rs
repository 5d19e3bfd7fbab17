//! Integration tests for pixelflut-client.
//!
//! These tests run the full stack against a small in-process Pixelflut
//! server listening on a real TCP socket.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pixelflut_client::protocol::{decode_get_response, encode_set};
use pixelflut_client::source::{Raster, SolidColor};
use pixelflut_client::{ClientConfig, Color, Connection, PixelflutError, Point, Session};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

type Canvas = Arc<Mutex<HashMap<(u32, u32), String>>>;

/// Fake server state shared with the test.
struct FakeServer {
    address: String,
    canvas: Canvas,
    /// Lines the server could not parse.
    garbage: Arc<Mutex<Vec<String>>>,
}

/// Serve one client: answer `SIZE` and `PX x y`, record `PX x y color`.
async fn spawn_server(width: u32, height: u32) -> FakeServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let canvas: Canvas = Arc::default();
    let garbage: Arc<Mutex<Vec<String>>> = Arc::default();

    let state = Arc::clone(&canvas);
    let bad = Arc::clone(&garbage);
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            let tokens: Vec<&str> = line.split(' ').collect();
            match tokens.as_slice() {
                ["SIZE"] => {
                    let reply = format!("SIZE {} {}\n", width, height);
                    write_half.write_all(reply.as_bytes()).await.unwrap();
                }
                ["PX", x, y] => {
                    let key = (x.parse().unwrap(), y.parse().unwrap());
                    let color = state
                        .lock()
                        .unwrap()
                        .get(&key)
                        .cloned()
                        .unwrap_or_else(|| "000000".to_string());
                    let reply = format!("PX {} {} {}\n", x, y, &color[..6]);
                    write_half.write_all(reply.as_bytes()).await.unwrap();
                }
                ["PX", x, y, color] if color.len() == 6 || color.len() == 8 => {
                    match (x.parse::<u32>(), y.parse::<u32>()) {
                        (Ok(x), Ok(y)) if x < width && y < height => {
                            state.lock().unwrap().insert((x, y), color.to_string());
                        }
                        _ => bad.lock().unwrap().push(line.clone()),
                    }
                }
                _ => bad.lock().unwrap().push(line.clone()),
            }
        }
    });

    FakeServer {
        address,
        canvas,
        garbage,
    }
}

fn config_for(server: &FakeServer, workers: usize) -> ClientConfig {
    let (host, port) = server.address.rsplit_once(':').unwrap();
    ClientConfig::new(host, port.parse().unwrap())
        .workers(workers)
        .read_timeout(Duration::from_secs(2))
}

/// Wait until the server has recorded `count` pixels.
async fn wait_for_pixels(canvas: &Canvas, count: usize) {
    for _ in 0..200 {
        if canvas.lock().unwrap().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "server recorded {} of {} pixels",
        canvas.lock().unwrap().len(),
        count
    );
}

/// Handshake reports the server's canvas size.
#[tokio::test]
async fn test_connect_and_query_size() {
    let server = spawn_server(800, 600).await;
    let session = Session::connect(&config_for(&server, 4)).await.unwrap();

    let size = session.canvas_size();
    assert_eq!((size.width, size.height), (800, 600));
    session.close().await.unwrap();
}

/// Many workers on one connection never corrupt a command.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_workers_keep_commands_intact() {
    let server = spawn_server(256, 256).await;
    let session = Session::connect(&config_for(&server, 8)).await.unwrap();

    let image = Arc::new(Raster::from_fn(200, 120, |x, y| {
        Color::rgb(x as u8, y as u8, (x ^ y) as u8)
    }));
    let report = session.draw(image, Point::new(10, 20)).await.unwrap();
    assert_eq!(report.chunks, 8);
    assert_eq!(report.commands, 200 * 120);

    wait_for_pixels(&server.canvas, 200 * 120).await;
    assert!(server.garbage.lock().unwrap().is_empty());

    let canvas = server.canvas.lock().unwrap();
    for (x, y) in [(0u32, 0u32), (199, 0), (57, 119), (199, 119)] {
        let expected = Color::rgb(x as u8, y as u8, (x ^ y) as u8).to_string();
        assert_eq!(canvas[&(x + 10, y + 20)], expected);
    }
}

/// A drawn pixel can be read back through the get round trip.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fill_then_read_back() {
    let server = spawn_server(64, 64).await;
    let session = Session::connect(&config_for(&server, 3)).await.unwrap();

    session
        .fill_rect(Point::new(5, 5), 10, 10, Color::rgb(0x12, 0x34, 0x56))
        .await
        .unwrap();
    wait_for_pixels(&server.canvas, 100).await;

    let inside = session.get_pixel(Point::new(14, 14)).await.unwrap();
    assert_eq!(inside, Color::rgb(0x12, 0x34, 0x56));

    let outside = session.get_pixel(Point::new(15, 15)).await.unwrap();
    assert_eq!(outside, Color::BLACK);

    session.close().await.unwrap();
}

/// Drawing the same image twice leaves the same canvas.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_redraw_gives_same_canvas() {
    let server = spawn_server(32, 32).await;
    let session = Session::connect(&config_for(&server, 4)).await.unwrap();
    let image = Arc::new(Raster::from_fn(16, 16, |x, y| {
        Color::rgb(x as u8 * 16, y as u8 * 16, 0)
    }));

    session.draw(Arc::clone(&image), Point::ORIGIN).await.unwrap();
    wait_for_pixels(&server.canvas, 256).await;
    let first = server.canvas.lock().unwrap().clone();

    session.draw(image, Point::ORIGIN).await.unwrap();
    // A get round trip orders after every earlier write
    session.get_pixel(Point::ORIGIN).await.unwrap();
    let second = server.canvas.lock().unwrap().clone();

    assert_eq!(first, second);
    session.close().await.unwrap();
}

/// Single-pixel sets keep their alpha on the wire.
#[tokio::test]
async fn test_set_pixel_with_alpha() {
    let server = spawn_server(10, 10).await;
    let session = Session::connect(&config_for(&server, 1)).await.unwrap();

    session
        .set_pixel(Point::new(3, 4), Color::rgba(255, 0, 0, 128))
        .await
        .unwrap();
    session.connection().flush().await.unwrap();
    wait_for_pixels(&server.canvas, 1).await;

    assert_eq!(server.canvas.lock().unwrap()[&(3, 4)], "ff000080");
    session.close().await.unwrap();
}

/// Raw connection primitives work without a session.
#[tokio::test]
async fn test_raw_connection_round_trip() {
    let server = spawn_server(20, 20).await;
    let config = config_for(&server, 1);
    let connection = Connection::connect(&server.address, config.connection_options())
        .await
        .unwrap();

    connection
        .send_command(encode_set(1, 1, Color::WHITE))
        .await
        .unwrap();
    let line = connection
        .send_and_receive(
            pixelflut_client::protocol::encode_get(1, 1),
            Duration::from_secs(2),
        )
        .await
        .unwrap();
    assert_eq!(decode_get_response(&line).unwrap(), Color::WHITE);

    connection.close().await.unwrap();
}

/// Nothing listening: connect fails with a connection error before drawing.
#[tokio::test]
async fn test_connect_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = Session::connect(&ClientConfig::new("127.0.0.1", port))
        .await
        .err()
        .unwrap();
    assert!(err.is_connection_error(), "{:?}", err);
}

/// Solid fills clip at the canvas edge.
#[tokio::test]
async fn test_fill_clips_at_canvas_edge() {
    let server = spawn_server(8, 8).await;
    let session = Session::connect(&config_for(&server, 2)).await.unwrap();

    let report = session
        .draw(Arc::new(SolidColor::new(4, 4, Color::WHITE)), Point::new(6, 6))
        .await
        .unwrap();
    assert_eq!(report.commands, 4);
    assert_eq!(report.clipped, 12);

    wait_for_pixels(&server.canvas, 4).await;
    assert!(server.garbage.lock().unwrap().is_empty());
    session.close().await.unwrap();
}

/// Zero workers is rejected before any connect attempt.
#[tokio::test]
async fn test_zero_workers_rejected() {
    let err = Session::connect(&ClientConfig::new("127.0.0.1", 1).workers(0))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, PixelflutError::InvalidArgument(_)));
}
