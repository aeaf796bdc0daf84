use anyhow::Result;
use isinscraper::{
    crawl_all,
    fetch::{FetchConfig, TableFetcher},
    output::write_csv,
};
use std::time::Duration;
use tempfile::tempdir;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

const HEAD: &str = "<tr><td>有價證券代號及名稱</td><td>國際證券辨識號碼</td>\
                    <td>上市日</td><td>市場別</td><td>產業別</td></tr>";

fn big5(html: &str) -> Vec<u8> {
    encoding_rs::BIG5.encode(html).0.into_owned()
}

fn listing(body_rows: &str) -> Vec<u8> {
    big5(&format!(
        "<html><body><table class='h4'>{HEAD}{body_rows}</table></body></html>"
    ))
}

fn stock(code_name: &str, segment: &str, industry: &str) -> String {
    format!(
        "<tr><td>{code_name}</td><td>TW0000000000</td><td>1962/02/09</td>\
         <td>{segment}</td><td>{industry}</td></tr>"
    )
}

fn marker(text: &str) -> String {
    format!("<tr><td colspan=5><B> {text}<B></td></tr>")
}

fn config(server: &MockServer) -> FetchConfig {
    FetchConfig {
        host: server.address().to_string(),
        timeout: Duration::from_secs(5),
        backoff: Duration::ZERO,
        ..FetchConfig::default()
    }
}

async fn serve(server: &MockServer, mode: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path("/isin/C_public.jsp"))
        .and(query_param("strMode", mode))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn https_failure_falls_back_to_http() -> Result<()> {
    let server = MockServer::start().await;
    serve(
        &server,
        "2",
        listing(&format!("{}{}", marker("股票"), stock("1101　台泥", "上市", "水泥工業"))),
    )
    .await;

    let fetcher = TableFetcher::new(config(&server))?;
    let table = fetcher.fetch(2).await.expect("table over plain http");
    assert_eq!(table.rows().len(), 3);
    assert_eq!(table.rows()[2][0], "1101　台泥");

    // the TLS handshake never reaches the mock as a request
    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url.scheme(), "http");
    Ok(())
}

#[tokio::test]
async fn crawl_three_segments_into_csv() -> Result<()> {
    let server = MockServer::start().await;

    let listed = [
        stock("0050　元大台灣50", "上市", ""),
        marker("股票"),
        stock("2330　台積電", "上市", "半導體業"),
        stock("1101　台泥", "上市", "水泥工業"),
        marker("上市認購(售)權證"),
        stock("030001　台泥元大5A購01", "上市", ""),
    ]
    .concat();
    serve(&server, "2", listing(&listed)).await;

    // OTC: one busy 503 page first, then the real table
    Mock::given(method("GET"))
        .and(path("/isin/C_public.jsp"))
        .and(query_param("strMode", "4"))
        .respond_with(
            ResponseTemplate::new(503).set_body_bytes(big5("<html><body>系統忙碌中</body></html>")),
        )
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    let otc = [
        marker("股票"),
        stock("2330　台積電", "上櫃", "半導體業"),
        stock("6488　環球晶", "上櫃", "半導體業"),
        marker("特別股"),
        stock("6548A　長科特", "上櫃", ""),
    ]
    .concat();
    serve(&server, "4", listing(&otc)).await;

    // emerging: never has a table
    serve(&server, "5", big5("<html><body>查無資料</body></html>")).await;

    let fetcher = TableFetcher::new(config(&server))?;
    let merged = crawl_all(&fetcher).await?;

    let rows: Vec<[&str; 4]> = merged.iter().map(|r| r.to_row()).collect();
    assert_eq!(
        rows,
        vec![
            ["1101", "台泥", "上市", "水泥工業"],
            ["2330", "台積電", "上市", "半導體業"],
            ["6488", "環球晶", "上櫃", "半導體業"],
        ]
    );

    let dir = tempdir()?;
    let out = dir.path().join("data").join("stock_list.csv");
    write_csv(&out, &merged)?;
    let text = std::fs::read_to_string(&out)?;
    let lines: Vec<&str> = text.trim_start_matches('\u{feff}').lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "代號,簡稱,市場別,產業別");
    assert_eq!(lines[1], "1101,台泥,上市,水泥工業");
    Ok(())
}
