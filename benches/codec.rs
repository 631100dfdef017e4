//! Consolidated codec benchmark replacing the teacher's per-construct parser benches
//! (`parse_method`/`parse_target`/`parse_version`/`parse_headers`) with one throughput-grouped
//! benchmark over the request/header scan this crate actually ships.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use stranded::net::raw::RawStream;
use stranded::{Connection, InfoMap, MessageLayer, Runtime, Strand, StreamLayer};

const REQ: &[u8] = b"\
GET /api/v1.0/weather/forecast HTTP/1.1\r\n\
Host: www.example.org\r\n\r\n";

const REQ_MED: &[u8] = b"\
GET /api/v1.0/weather/forecast HTTP/1.1\r\n\
Accept:*/*\r\n\
Accept-Encoding:gzip,deflate,br\r\n\
Accept-Language:en-US,en;q=0.5\r\n\
Cache-Control:no-cache\r\n\
Connection:keep-alive\r\n\
DNT:1\r\n\
Host: www.example.org\r\n\
Pragma:no-cache\r\n\
Referrer:https://www.example.org\r\n\
Sec-Fetch-Dest:empty\r\n\
Sec-Fetch-Mode:cors\r\n\
Sec-Fetch-Site:same-origin\r\n\
User-Agent:Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/109.0\r\n\r\n";

const REQ_LONG: &[u8] = b"POST /log?format=json&hasfast=true HTTP/1.1\r\n\
Host: play.google.com\r\n\
User-Agent: Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/109.0\r\n\
Accept: */*\r\n\
Accept-Language: en-US,en;q=0.5\r\n\
Accept-Encoding: gzip, deflate, br\r\n\
Referer: https://www.google.com/\r\n\
Content-Type: application/x-www-form-urlencoded;charset=utf-8\r\n\
Content-Length: 669\r\n\
Origin: https://www.google.com\r\n\
DNT: 1\r\n\
Connection: keep-alive\r\n\
Sec-Fetch-Dest: empty\r\n\
Sec-Fetch-Mode: cors\r\n\
Sec-Fetch-Site: same-site\r\n\
Pragma: no-cache\r\n\
Cache-Control: no-cache\r\n\
TE: trailers\r\n\r\n";

fn benchmark(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    rt.run();

    let inputs: [&[u8]; 3] = [REQ, REQ_MED, REQ_LONG];
    let mut group = c.benchmark_group("message_codec");
    for &input in inputs.iter() {
        group.throughput(Throughput::Bytes(input.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("read_request_headers", input.len() as u64),
            input,
            |b, bytes| {
                b.iter(|| {
                    rt.run_join(async {
                        let strand = Strand::new(&rt);
                        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
                        let addr = listener.local_addr().unwrap();
                        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
                        let mut writer = tokio::net::TcpStream::connect(addr).await.unwrap();
                        let reader = accept.await.unwrap();

                        use tokio::io::AsyncWriteExt;
                        writer.write_all(bytes).await.unwrap();

                        let mut message = MessageLayer::new(StreamLayer::new(Connection::plain(
                            RawStream::Tcp(reader),
                            InfoMap::new(),
                            strand,
                        )));
                        let _ = message.async_read_request_headers().await.unwrap();
                    });
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
