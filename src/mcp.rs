//! MCP (Model Context Protocol) server implementation.
//!
//! Exposes image generation and editing as tools that AI agents can call.
//! Messages are JSON-RPC 2.0, one per line on stdin/stdout.

use crate::error::ImgxError;
use crate::image::ImageFormat;
use crate::orchestrator::{ImageRequest, InputSource, Orchestrator, Outcome};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

/// Maximum images per generate_image call.
const MAX_COUNT: u32 = 4;

const ASPECT_RATIOS: [&str; 7] = ["1:1", "2:3", "3:2", "3:4", "4:3", "9:16", "16:9"];
const RESOLUTIONS: [&str; 3] = ["1K", "2K", "4K"];
const OUTPUT_FORMATS: [&str; 3] = ["png", "jpeg", "webp"];

/// Validates that an output path is safe to write to.
///
/// Rejects paths containing directory traversal (`..`) components.
fn validate_output_path(path: &str) -> std::result::Result<(), String> {
    let path = std::path::Path::new(path);
    for component in path.components() {
        if matches!(component, std::path::Component::ParentDir) {
            return Err("Path must not contain '..' components".into());
        }
    }
    Ok(())
}

/// JSON-RPC 2.0 request.
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error.
#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

impl JsonRpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }

    /// Tool result carrying one text item.
    fn tool_text(id: Value, text: String, is_error: bool) -> Self {
        let mut result = json!({ "content": [{ "type": "text", "text": text }] });
        if is_error {
            result["isError"] = json!(true);
        }
        Self::success(id, result)
    }

    /// Tool result for a failed invocation: `Error: <message>`.
    fn tool_error(id: Value, err: &ImgxError) -> Self {
        Self::tool_text(id, format!("Error: {err}"), true)
    }
}

/// MCP tool definition.
#[derive(Debug, Serialize)]
struct Tool {
    name: &'static str,
    description: &'static str,
    #[serde(rename = "inputSchema")]
    input_schema: Value,
}

/// Parameters shared by the image tools.
#[derive(Debug, Clone, Default, Deserialize)]
struct ImageToolParams {
    prompt: String,
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    output_dir: Option<String>,
    #[serde(default)]
    aspect_ratio: Option<String>,
    #[serde(default)]
    resolution: Option<String>,
    #[serde(default)]
    count: Option<u32>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    output_format: Option<String>,
}

/// edit_image tool parameters.
#[derive(Debug, Clone, Deserialize)]
struct EditImageParams {
    input: String,
    #[serde(flatten)]
    common: ImageToolParams,
}

impl ImageToolParams {
    /// Validates the arguments and turns them into a request.
    fn into_request(self) -> std::result::Result<ImageRequest, String> {
        for path in [&self.output, &self.output_dir].into_iter().flatten() {
            validate_output_path(path)?;
        }
        if let Some(count) = self.count {
            if !(1..=MAX_COUNT).contains(&count) {
                return Err(format!("count must be between 1 and {MAX_COUNT}"));
            }
        }
        if let Some(ratio) = &self.aspect_ratio {
            if !ASPECT_RATIOS.contains(&ratio.as_str()) {
                return Err(format!(
                    "Invalid aspect_ratio '{ratio}'. Valid values: {}",
                    ASPECT_RATIOS.join(", ")
                ));
            }
        }
        if let Some(resolution) = &self.resolution {
            if !RESOLUTIONS.contains(&resolution.as_str()) {
                return Err(format!(
                    "Invalid resolution '{resolution}'. Valid values: {}",
                    RESOLUTIONS.join(", ")
                ));
            }
        }
        let output_format = self
            .output_format
            .as_deref()
            .map(str::parse::<ImageFormat>)
            .transpose()?;

        Ok(ImageRequest {
            prompt: self.prompt,
            output: self.output.map(PathBuf::from),
            output_dir: self.output_dir.map(PathBuf::from),
            aspect_ratio: self.aspect_ratio,
            resolution: self.resolution,
            count: self.count,
            model: self.model,
            provider: self.provider,
            output_format,
        })
    }
}

/// Input schema properties shared by the image tools.
fn common_properties() -> serde_json::Map<String, Value> {
    let properties = json!({
        "prompt": {
            "type": "string",
            "description": "Image description or edit instruction"
        },
        "output": {
            "type": "string",
            "description": "Output file path. With several images, -1, -2, ... is inserted before the extension"
        },
        "output_dir": {
            "type": "string",
            "description": "Output directory (default: configured outputDir, then ~/Pictures/imgx)"
        },
        "aspect_ratio": {
            "type": "string",
            "enum": ASPECT_RATIOS,
            "description": "Aspect ratio"
        },
        "resolution": {
            "type": "string",
            "enum": RESOLUTIONS,
            "description": "Output resolution"
        },
        "model": {
            "type": "string",
            "description": "Model name. Call list_providers to see the models of each provider"
        },
        "provider": {
            "type": "string",
            "description": "Provider name (default: configured provider, then gemini)"
        },
        "output_format": {
            "type": "string",
            "enum": OUTPUT_FORMATS,
            "description": "Output format (providers with OUTPUT_FORMAT only)"
        }
    });
    match properties {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

/// MCP server for image generation.
pub struct McpServer {
    orchestrator: Orchestrator,
    initialized: bool,
}

impl McpServer {
    /// Creates a server over an orchestrator.
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            initialized: false,
        }
    }

    /// Run the MCP server, reading from stdin and writing to stdout.
    pub async fn run(&mut self) -> io::Result<()> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();

        tracing::info!(
            providers = ?self.orchestrator.registry().names(),
            "MCP server listening on stdio"
        );

        for line in stdin.lock().lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let response = self.handle_message(&line).await;
            if let Some(resp) = response {
                let json = serde_json::to_string(&resp).unwrap_or_else(|e| {
                    json!({"jsonrpc": "2.0", "id": null, "error": {"code": -32603, "message": e.to_string()}}).to_string()
                });
                writeln!(stdout, "{}", json)?;
                stdout.flush()?;
            }
        }

        Ok(())
    }

    async fn handle_message(&mut self, message: &str) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(message) {
            Ok(r) => r,
            Err(e) => {
                return Some(JsonRpcResponse::error(
                    Value::Null,
                    -32700,
                    format!("Parse error: {}", e),
                ));
            }
        };

        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                request.id.unwrap_or(Value::Null),
                -32600,
                "Invalid JSON-RPC version",
            ));
        }

        let id = request.id.clone().unwrap_or(Value::Null);
        tracing::debug!(method = %request.method, "received request");

        match request.method.as_str() {
            "initialize" => Some(self.handle_initialize(id, &request.params)),
            "initialized" | "notifications/initialized" => None,
            "tools/list" => Some(self.handle_tools_list(id)),
            "tools/call" => Some(self.handle_tools_call(id, &request.params).await),
            "ping" => Some(JsonRpcResponse::success(id, json!({}))),
            _ => Some(JsonRpcResponse::error(
                id,
                -32601,
                format!("Method not found: {}", request.method),
            )),
        }
    }

    fn handle_initialize(&mut self, id: Value, params: &Value) -> JsonRpcResponse {
        self.initialized = true;

        if let Some(client_info) = params.get("clientInfo") {
            tracing::info!(
                client = client_info
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown"),
                version = client_info
                    .get("version")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown"),
                "MCP client connected"
            );
        }

        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": "imgx",
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        )
    }

    fn handle_tools_list(&self, id: Value) -> JsonRpcResponse {
        let mut generate = common_properties();
        generate.insert(
            "count".into(),
            json!({
                "type": "integer",
                "minimum": 1,
                "maximum": MAX_COUNT,
                "description": "Number of images (providers with MULTIPLE_OUTPUTS only)"
            }),
        );

        let mut edit = common_properties();
        edit.insert(
            "input".into(),
            json!({ "type": "string", "description": "Input image file path" }),
        );

        let tools = vec![
            Tool {
                name: "generate_image",
                description: "Generate an image from a text prompt",
                input_schema: json!({
                    "type": "object",
                    "properties": generate,
                    "required": ["prompt"]
                }),
            },
            Tool {
                name: "edit_image",
                description: "Edit an existing image with text instructions",
                input_schema: json!({
                    "type": "object",
                    "properties": edit,
                    "required": ["input", "prompt"]
                }),
            },
            Tool {
                name: "edit_last",
                description: "Edit the last generated/edited image with new text instructions. Uses the output of the previous generate_image or edit_image call as input.",
                input_schema: json!({
                    "type": "object",
                    "properties": common_properties(),
                    "required": ["prompt"]
                }),
            },
            Tool {
                name: "list_providers",
                description: "List available image providers and their capabilities",
                input_schema: json!({
                    "type": "object",
                    "properties": {},
                    "required": []
                }),
            },
        ];

        JsonRpcResponse::success(id, json!({ "tools": tools }))
    }

    async fn handle_tools_call(&self, id: Value, params: &Value) -> JsonRpcResponse {
        let tool_name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
        if !self.initialized {
            tracing::warn!(tool = tool_name, "tools/call received before initialize");
        }
        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

        match tool_name {
            "list_providers" => self.list_providers(id),
            "generate_image" => self.generate_image(id, arguments).await,
            "edit_image" => self.edit_image(id, arguments).await,
            "edit_last" => self.edit_last(id, arguments).await,
            _ => JsonRpcResponse::error(id, -32602, format!("Unknown tool: {}", tool_name)),
        }
    }

    fn list_providers(&self, id: Value) -> JsonRpcResponse {
        let providers: Vec<_> = self
            .orchestrator
            .registry()
            .list()
            .iter()
            .map(|p| p.info())
            .collect();
        let text = json!({ "providers": providers }).to_string();
        JsonRpcResponse::tool_text(id, text, false)
    }

    async fn generate_image(&self, id: Value, arguments: Value) -> JsonRpcResponse {
        let params: ImageToolParams = match serde_json::from_value(arguments) {
            Ok(p) => p,
            Err(e) => {
                return JsonRpcResponse::error(id, -32602, format!("Invalid parameters: {}", e));
            }
        };
        let request = match params.into_request() {
            Ok(r) => r,
            Err(msg) => return JsonRpcResponse::error(id, -32602, msg),
        };

        let result = self.orchestrator.generate(&request).await;
        Self::outcome_response(id, result)
    }

    async fn edit_image(&self, id: Value, arguments: Value) -> JsonRpcResponse {
        let params: EditImageParams = match serde_json::from_value(arguments) {
            Ok(p) => p,
            Err(e) => {
                return JsonRpcResponse::error(id, -32602, format!("Invalid parameters: {}", e));
            }
        };
        let request = match params.common.into_request() {
            Ok(r) => ImageRequest { count: None, ..r },
            Err(msg) => return JsonRpcResponse::error(id, -32602, msg),
        };

        let source = InputSource::Path(PathBuf::from(params.input));
        let result = self.orchestrator.edit(&request, source).await;
        Self::outcome_response(id, result)
    }

    async fn edit_last(&self, id: Value, arguments: Value) -> JsonRpcResponse {
        let params: ImageToolParams = match serde_json::from_value(arguments) {
            Ok(p) => p,
            Err(e) => {
                return JsonRpcResponse::error(id, -32602, format!("Invalid parameters: {}", e));
            }
        };
        let request = match params.into_request() {
            Ok(r) => ImageRequest { count: None, ..r },
            Err(msg) => return JsonRpcResponse::error(id, -32602, msg),
        };

        let result = self.orchestrator.edit(&request, InputSource::LastOutput).await;
        Self::outcome_response(id, result)
    }

    fn outcome_response(id: Value, result: crate::Result<Outcome>) -> JsonRpcResponse {
        match result {
            Ok(outcome) => {
                let mut body = json!({ "success": true, "filePaths": outcome.file_paths });
                if let Some(input) = outcome.input_used {
                    body["inputUsed"] = json!(input);
                }
                JsonRpcResponse::tool_text(id, body.to_string(), false)
            }
            Err(err) => {
                tracing::warn!("tool call failed: {err}");
                JsonRpcResponse::tool_error(id, &err)
            }
        }
    }
}
