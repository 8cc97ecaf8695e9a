use crate::llm::LlmError;
use futures::stream::{self, BoxStream, Stream, StreamExt};

/// Splits a chunked HTTP body into newline-delimited lines.
///
/// Both SSE (`data: ...`) and NDJSON bodies are line oriented; chunk
/// boundaries may fall anywhere, including inside a UTF-8 sequence.
pub fn lines<S, B, E>(body: S) -> BoxStream<'static, Result<String, LlmError>>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = (Box::pin(body), Vec::<u8>::new(), false);

    stream::unfold(state, |(mut body, mut buffer, mut exhausted)| async move {
        loop {
            if let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let rest = buffer.split_off(pos + 1);
                let line = std::mem::replace(&mut buffer, rest);
                let text = String::from_utf8_lossy(&line).trim_end().to_string();
                return Some((Ok(text), (body, buffer, exhausted)));
            }

            if exhausted {
                if buffer.is_empty() {
                    return None;
                }
                let text = String::from_utf8_lossy(&buffer).trim_end().to_string();
                buffer.clear();
                return Some((Ok(text), (body, buffer, exhausted)));
            }

            match body.next().await {
                Some(Ok(chunk)) => buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    // Drop whatever is buffered; the stream ends after the error
                    buffer.clear();
                    exhausted = true;
                    let err = LlmError::ConnectionError(format!("stream interrupted: {}", e));
                    return Some((Err(err), (body, buffer, exhausted)));
                }
                None => exhausted = true,
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lines_across_chunk_boundaries() {
        let chunks: Vec<Result<&'static [u8], String>> = vec![
            Ok(b"data: a"),
            Ok(b"bc\ndata: d\n\nda"),
            Ok(b"ta: tail"),
        ];
        let collected: Vec<String> = lines(stream::iter(chunks))
            .map(|l| l.unwrap())
            .collect()
            .await;

        assert_eq!(collected, vec!["data: abc", "data: d", "", "data: tail"]);
    }

    #[tokio::test]
    async fn test_lines_surfaces_transport_error() {
        let chunks: Vec<Result<&'static [u8], String>> =
            vec![Ok(b"one\n"), Err("reset".to_string())];
        let collected: Vec<Result<String, LlmError>> = lines(stream::iter(chunks)).collect().await;

        assert_eq!(collected.len(), 2);
        assert_eq!(collected[0].as_ref().unwrap(), "one");
        assert!(matches!(collected[1], Err(LlmError::ConnectionError(_))));
    }
}
