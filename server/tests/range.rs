mod fixtures;

use std::io::SeekFrom;
use std::time::Duration;

use fixtures::serve_objects;

use common::error::PipelineError;
use server::stream::RangeStream;

fn sample_bytes() -> Vec<u8> {
    (0..10_000u32).map(|i| (i % 251) as u8).collect()
}

fn stream_for(addr: std::net::SocketAddr, path: &str) -> RangeStream {
    RangeStream::new(
        reqwest::Client::new(),
        format!("http://{addr}{path}"),
        Duration::from_secs(10),
    )
}

#[tokio::test]
async fn read_after_seek_matches_slice() {
    let full = sample_bytes();
    let addr = serve_objects(vec![("blob.bin", "application/octet-stream", full.clone())]).await;

    let mut stream = stream_for(addr, "/objects/blob.bin");

    for (offset, n) in [(0usize, 100usize), (1, 1), (5_000, 2_500), (9_990, 100)] {
        stream.seek(SeekFrom::Start(offset as u64)).await.unwrap();

        let chunk = stream.read(n).await.unwrap();
        let expected = &full[offset..(offset + n).min(full.len())];

        assert_eq!(chunk.as_ref(), expected);
    }
}

#[tokio::test]
async fn seek_then_tell_round_trips() {
    let addr = serve_objects(vec![(
        "blob.bin",
        "application/octet-stream",
        sample_bytes(),
    )])
    .await;

    let mut stream = stream_for(addr, "/objects/blob.bin");

    assert_eq!(stream.seek(SeekFrom::Start(1234)).await.unwrap(), 1234);
    assert_eq!(stream.tell(), 1234);

    assert_eq!(stream.seek(SeekFrom::Current(66)).await.unwrap(), 1300);
    assert_eq!(stream.tell(), 1300);

    assert_eq!(stream.seek(SeekFrom::End(-100)).await.unwrap(), 9_900);
    assert_eq!(stream.tell(), 9_900);

    assert_eq!(stream.seek(SeekFrom::End(0)).await.unwrap(), 10_000);
    assert_eq!(stream.tell(), 10_000);
}

#[tokio::test]
async fn short_forward_seeks_drain_in_place() {
    let full = sample_bytes();
    let addr = serve_objects(vec![("blob.bin", "application/octet-stream", full.clone())]).await;

    let mut stream = stream_for(addr, "/objects/blob.bin");

    // open a reader, then hop forward by less than the drain threshold
    let _ = stream.read(10).await.unwrap();
    stream.seek(SeekFrom::Current(500)).await.unwrap();

    let chunk = stream.read(10).await.unwrap();
    assert_eq!(chunk.as_ref(), &full[510..520]);
}

#[tokio::test]
async fn size_is_probed_once_and_cached() {
    let addr = serve_objects(vec![(
        "blob.bin",
        "application/octet-stream",
        sample_bytes(),
    )])
    .await;

    let mut stream = stream_for(addr, "/objects/blob.bin");

    assert_eq!(stream.size().await.unwrap(), 10_000);
    assert_eq!(stream.size().await.unwrap(), 10_000);

    // probing must not move the read position
    assert_eq!(stream.tell(), 0);
}

#[tokio::test]
async fn media_type_is_learned_from_the_response() {
    let addr = serve_objects(vec![("notes.txt", "text/plain", b"hello".to_vec())]).await;

    let mut stream = stream_for(addr, "/objects/notes.txt");
    assert_eq!(stream.media_type(), None);

    let _ = stream.read(5).await.unwrap();
    assert_eq!(stream.media_type(), Some("text/plain"));
}

#[tokio::test]
async fn read_to_end_drains_the_object() {
    let full = sample_bytes();
    let addr = serve_objects(vec![("blob.bin", "application/octet-stream", full.clone())]).await;

    let mut stream = stream_for(addr, "/objects/blob.bin");
    stream.seek(SeekFrom::Start(9_000)).await.unwrap();

    assert_eq!(stream.read_to_end().await.unwrap(), &full[9_000..]);
    assert!(stream.read(100).await.unwrap().is_empty());
}

#[tokio::test]
async fn servers_without_range_support_are_rejected() {
    let addr = serve_objects(vec![(
        "blob.bin",
        "application/octet-stream",
        sample_bytes(),
    )])
    .await;

    let mut stream = stream_for(addr, "/norange/blob.bin");

    let err = stream.read(10).await.unwrap_err();
    assert!(matches!(err, PipelineError::RangeUnsupported));

    let mut stream = stream_for(addr, "/norange/blob.bin");
    let err = stream.size().await.unwrap_err();
    assert!(matches!(err, PipelineError::SizeUnavailable));
}
