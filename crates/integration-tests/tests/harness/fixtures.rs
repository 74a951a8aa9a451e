//! Canned provider payloads in each wire format

use serde_json::{Value, json};

/// `data: <payload>\n\n`
pub fn frame(payload: &Value) -> String {
    format!("data: {payload}\n\n")
}

/// `OpenAI` unary completion
pub fn openai_completion(text: &str) -> Value {
    json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "gpt-4o-mock",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": text},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 11, "completion_tokens": 7, "total_tokens": 18}
    })
}

/// `OpenAI` stream: role chunk, one chunk per delta, finish chunk, usage chunk, `[DONE]`
pub fn openai_stream(deltas: &[&str]) -> Vec<String> {
    let mut frames = vec![frame(&json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion.chunk",
        "choices": [{"index": 0, "delta": {"role": "assistant"}, "finish_reason": null}]
    }))];

    frames.extend(deltas.iter().map(|delta| {
        frame(&json!({
            "id": "chatcmpl-mock",
            "object": "chat.completion.chunk",
            "choices": [{"index": 0, "delta": {"content": delta}, "finish_reason": null}]
        }))
    }));

    frames.push(frame(&json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion.chunk",
        "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]
    })));
    frames.push(frame(&json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion.chunk",
        "choices": [],
        "usage": {"prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8}
    })));
    frames.push("data: [DONE]\n\n".to_owned());
    frames
}

/// Anthropic unary message
pub fn anthropic_message(text: &str) -> Value {
    json!({
        "id": "msg_mock",
        "type": "message",
        "role": "assistant",
        "model": "claude-mock",
        "content": [{"type": "text", "text": text}],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 20, "output_tokens": 4}
    })
}

/// Anthropic stream with the usual event sequence
pub fn anthropic_stream(deltas: &[&str]) -> Vec<String> {
    let event = |name: &str, payload: Value| format!("event: {name}\ndata: {payload}\n\n");

    let mut frames = vec![
        event(
            "message_start",
            json!({"type": "message_start", "message": {"id": "msg_mock", "role": "assistant", "usage": {"input_tokens": 20, "output_tokens": 1}}}),
        ),
        event(
            "content_block_start",
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
        ),
        event("ping", json!({"type": "ping"})),
    ];

    frames.extend(deltas.iter().map(|delta| {
        event(
            "content_block_delta",
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": delta}}),
        )
    }));

    frames.push(event("content_block_stop", json!({"type": "content_block_stop", "index": 0})));
    frames.push(event(
        "message_delta",
        json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 9}}),
    ));
    frames.push(event("message_stop", json!({"type": "message_stop"})));
    frames
}

/// Google unary response
pub fn google_response(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP",
            "index": 0
        }],
        "usageMetadata": {"promptTokenCount": 6, "candidatesTokenCount": 2, "totalTokenCount": 8}
    })
}

/// Google stream; the last event carries the finish reason and usage
pub fn google_stream(deltas: &[&str]) -> Vec<String> {
    let last = deltas.len().saturating_sub(1);
    deltas
        .iter()
        .enumerate()
        .map(|(i, delta)| {
            let mut payload = json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": delta}]}, "index": 0}]
            });
            if i == last {
                payload["candidates"][0]["finishReason"] = json!("STOP");
                payload["usageMetadata"] =
                    json!({"promptTokenCount": 4, "candidatesTokenCount": 6, "totalTokenCount": 10});
            }
            frame(&payload)
        })
        .collect()
}

/// Minimal canonical request body
pub fn chat_body(model: &str, stream: bool) -> Value {
    json!({
        "model": model,
        "messages": [{"role": "user", "content": "Hello"}],
        "stream": stream
    })
}

/// `data:` payloads of an SSE response body, in order
pub fn sse_data(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(str::to_owned)
        .collect()
}

/// Parsed chunks of a canonical stream, excluding `[DONE]`
pub fn sse_chunks(text: &str) -> Vec<Value> {
    sse_data(text)
        .iter()
        .filter(|data| *data != "[DONE]")
        .map(|data| serde_json::from_str(data).unwrap())
        .collect()
}

/// Concatenated delta content of a canonical stream
pub fn streamed_text(chunks: &[Value]) -> String {
    chunks
        .iter()
        .filter_map(|chunk| chunk["choices"][0]["delta"]["content"].as_str())
        .collect()
}
