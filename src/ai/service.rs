//! AI assistant operations.
//!
//! Each operation resolves an [`AiConfig`], builds a system + user prompt and
//! sends it through the [`AiClient`].

use crate::ai::client::{AiClient, ChatMessage, StreamEvent};
use crate::ai::config::{AiConfig, AiConfigStore, RoleRegistry};
use crate::error::{AiError, AiResult};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const DEFAULT_TEST_DATA_ROWS: u32 = 10;

/// Capacity of the channel between the upstream reader and the SSE response.
const STREAM_BUFFER: usize = 64;

mod prompts {
    pub const GENERATE_SQL_SYSTEM: &str = "You are a professional SQL assistant. Generate SQL statements from the user's requirements. Return only the SQL statement without any explanation.";
    pub const EXPLAIN_SQL_SYSTEM: &str =
        "You are a SQL expert. Explain what SQL statements do in clear and concise language.";
    pub const OPTIMIZE_SQL_SYSTEM: &str =
        "You are a SQL performance tuning expert. Provide SQL optimization advice.";
    pub const CRUD_SYSTEM: &str =
        "You are a SQL expert. Generate complete CRUD SQL statements from table structures.";
    pub const TEST_DATA_SYSTEM: &str =
        "You are a data generation expert. Generate realistic test data from table structures.";
    pub const QUERY_PLAN_SYSTEM: &str = "You are a SQL performance analysis expert who can interpret execution plans and suggest optimizations.";
    pub const QUERY_RESULT_SYSTEM: &str =
        "You are a data analyst. Summarize query results and point out notable patterns.";
    pub const ERROR_SYSTEM: &str =
        "You are a database troubleshooting expert. Diagnose SQL errors and propose fixes.";

    pub fn generate_sql(input: &str) -> String {
        format!(
            "Generate a SQL statement for the following requirement:\n{input}\n\n\
             Notes:\n\
             1. Return only the SQL statement\n\
             2. Use standard SQL syntax\n\
             3. Assume table and column names are in English"
        )
    }

    pub fn explain_sql(sql: &str) -> String {
        format!("Explain what the following SQL statement does and how it executes:\n\n{sql}")
    }

    pub fn optimize_sql(sql: &str) -> String {
        format!(
            "Optimize the following SQL statement for performance:\n\n{sql}\n\n\
             Provide the optimized SQL and briefly describe each improvement."
        )
    }

    pub fn generate_crud(table: &str, columns: &str) -> String {
        format!(
            "Generate complete CRUD SQL statements for table {table}. The table structure is:\n{columns}\n\n\
             Generate the following statements:\n\
             1. CREATE TABLE\n\
             2. INSERT\n\
             3. SELECT (with conditional filters)\n\
             4. UPDATE\n\
             5. DELETE\n\n\
             Return them in markdown code blocks with brief comments."
        )
    }

    pub fn generate_test_data(table: &str, columns: &str, rows: u32) -> String {
        format!(
            "Generate {rows} rows of test data for table {table}. The table structure is:\n{columns}\n\n\
             Requirements:\n\
             1. Produce INSERT statements\n\
             2. Values should be realistic and consistent\n\
             3. Use multi-row INSERT statements\n\
             4. Respect foreign key constraints\n\
             5. Use date formats supported by MySQL"
        )
    }

    pub fn explain_query_plan(sql: &str, plan: &str) -> String {
        format!(
            "Analyze the execution plan of the following SQL statement.\n\n\
             SQL:\n{sql}\n\nExecution plan:\n{plan}\n\n\
             Cover:\n\
             1. What each step does\n\
             2. Performance bottlenecks\n\
             3. Index usage\n\
             4. Optimization suggestions"
        )
    }

    pub fn analyze_query_result(sql: &str, result: &str) -> String {
        format!(
            "Analyze the result of the following query.\n\n\
             SQL:\n{sql}\n\nResult (JSON):\n{result}\n\n\
             Summarize the data, highlight trends or anomalies, and suggest follow-up queries."
        )
    }

    pub fn analyze_error(sql: &str, error: &str) -> String {
        format!(
            "The following SQL statement failed.\n\n\
             SQL:\n{sql}\n\nError:\n{error}\n\n\
             Explain the likely cause and provide a corrected statement."
        )
    }
}

/// Strip markdown code fences from a generated statement.
pub fn strip_sql_fences(content: &str) -> String {
    content.replace("```sql", "").replace("```", "").trim().to_string()
}

/// Request for free-form and streaming chat.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    pub config_id: Option<String>,
    pub role_id: Option<String>,
    /// Takes precedence over the role's prompt
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    /// Table descriptions appended to the system prompt
    #[serde(default)]
    pub table_contexts: Vec<JsonValue>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

fn render_table_context(context: &JsonValue) -> String {
    match context {
        JsonValue::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// AI assistant facade shared by the HTTP handlers.
#[derive(Clone)]
pub struct AiService {
    client: AiClient,
    configs: AiConfigStore,
    roles: RoleRegistry,
    stream_idle_timeout: Duration,
}

impl AiService {
    pub fn new(
        client: AiClient,
        configs: AiConfigStore,
        roles: RoleRegistry,
        stream_idle_timeout: Duration,
    ) -> Self {
        Self {
            client,
            configs,
            roles,
            stream_idle_timeout,
        }
    }

    pub fn configs(&self) -> &AiConfigStore {
        &self.configs
    }

    pub fn roles(&self) -> &RoleRegistry {
        &self.roles
    }

    async fn ask(&self, config_id: Option<&str>, system: &str, prompt: String) -> AiResult<String> {
        let config = self.configs.resolve(config_id).await?;
        self.ask_with(&config, system, prompt).await
    }

    async fn ask_with(&self, config: &AiConfig, system: &str, prompt: String) -> AiResult<String> {
        let messages = [ChatMessage::system(system), ChatMessage::user(prompt)];
        self.client.complete(config, &messages).await
    }

    /// Turn a natural-language requirement into SQL.
    pub async fn generate_sql(&self, input: &str, config_id: Option<&str>) -> AiResult<String> {
        let input = required(input, "Input must not be empty")?;
        let config = self.configs.resolve(config_id).await?;
        self.generate_sql_with(&config, input).await
    }

    async fn generate_sql_with(&self, config: &AiConfig, input: &str) -> AiResult<String> {
        let content = self
            .ask_with(config, prompts::GENERATE_SQL_SYSTEM, prompts::generate_sql(input))
            .await?;
        Ok(strip_sql_fences(&content))
    }

    pub async fn explain_sql(&self, sql: &str, config_id: Option<&str>) -> AiResult<String> {
        let sql = required(sql, "SQL must not be empty")?;
        self.ask(config_id, prompts::EXPLAIN_SQL_SYSTEM, prompts::explain_sql(sql))
            .await
    }

    pub async fn optimize_sql(&self, sql: &str, config_id: Option<&str>) -> AiResult<String> {
        let sql = required(sql, "SQL must not be empty")?;
        self.ask(config_id, prompts::OPTIMIZE_SQL_SYSTEM, prompts::optimize_sql(sql))
            .await
    }

    pub async fn generate_crud(
        &self,
        table_name: &str,
        columns: &str,
        config_id: Option<&str>,
    ) -> AiResult<String> {
        let table_name = required(table_name, "Table name must not be empty")?;
        let columns = required(columns, "Table structure must not be empty")?;
        self.ask(
            config_id,
            prompts::CRUD_SYSTEM,
            prompts::generate_crud(table_name, columns),
        )
        .await
    }

    pub async fn generate_test_data(
        &self,
        table_name: &str,
        columns: &str,
        row_count: Option<u32>,
        config_id: Option<&str>,
    ) -> AiResult<String> {
        let table_name = required(table_name, "Table name must not be empty")?;
        let columns = required(columns, "Table structure must not be empty")?;
        let rows = row_count.unwrap_or(DEFAULT_TEST_DATA_ROWS);
        self.ask(
            config_id,
            prompts::TEST_DATA_SYSTEM,
            prompts::generate_test_data(table_name, columns, rows),
        )
        .await
    }

    pub async fn explain_query_plan(
        &self,
        sql: &str,
        plan: &str,
        config_id: Option<&str>,
    ) -> AiResult<String> {
        let sql = required(sql, "SQL must not be empty")?;
        let plan = required(plan, "Execution plan must not be empty")?;
        self.ask(
            config_id,
            prompts::QUERY_PLAN_SYSTEM,
            prompts::explain_query_plan(sql, plan),
        )
        .await
    }

    pub async fn analyze_query_result(
        &self,
        sql: &str,
        result: &JsonValue,
        config_id: Option<&str>,
    ) -> AiResult<String> {
        let sql = required(sql, "SQL must not be empty")?;
        if result.is_null() {
            return Err(AiError::invalid_input("Query result must not be empty"));
        }
        let rendered = serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string());
        self.ask(
            config_id,
            prompts::QUERY_RESULT_SYSTEM,
            prompts::analyze_query_result(sql, &rendered),
        )
        .await
    }

    pub async fn analyze_error(
        &self,
        sql: &str,
        error: &str,
        config_id: Option<&str>,
    ) -> AiResult<String> {
        let sql = required(sql, "SQL must not be empty")?;
        let error = required(error, "Error message must not be empty")?;
        self.ask(
            config_id,
            prompts::ERROR_SYSTEM,
            prompts::analyze_error(sql, error),
        )
        .await
    }

    /// Chat with an optional role or system prompt, history and table contexts.
    pub async fn free_chat(&self, request: &ChatRequest) -> AiResult<String> {
        required(&request.message, "Message must not be empty")?;
        let config = self.configs.resolve(request.config_id.as_deref()).await?;
        let messages = self.chat_messages(request).await;
        self.client.complete(&config, &messages).await
    }

    /// Start a streaming chat and return the receiving end of its events.
    ///
    /// The upstream call runs on a spawned task. The channel always ends with
    /// [`StreamEvent::Done`], preceded by [`StreamEvent::Error`] on failure.
    pub fn stream_chat(&self, request: ChatRequest) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let service = self.clone();

        tokio::spawn(async move {
            if let Err(e) = service.run_stream(&request, &tx).await {
                warn!(error = %e, "Chat stream failed");
                let _ = tx.send(StreamEvent::Error(e.to_string())).await;
            }
            let _ = tx.send(StreamEvent::Done).await;
        });

        rx
    }

    async fn run_stream(
        &self,
        request: &ChatRequest,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> AiResult<()> {
        required(&request.message, "Message must not be empty")?;
        let config = self.configs.resolve(request.config_id.as_deref()).await?;
        info!(
            config_id = %config.id,
            role_id = request.role_id.as_deref().unwrap_or(""),
            "Starting chat stream"
        );

        let messages = self.chat_messages(request).await;
        self.client
            .stream(&config, &messages, self.stream_idle_timeout, tx)
            .await
    }

    /// Run a trivial generation against a stored config.
    pub async fn test_config(&self, id: &str) -> AiResult<()> {
        let config = self
            .configs
            .get(id)
            .await
            .ok_or_else(|| AiError::ConfigNotFound { id: id.to_string() })?;
        let reply = self.generate_sql_with(&config, "SELECT 1").await?;
        debug!(config_id = %id, reply_len = reply.len(), "AI configuration test succeeded");
        Ok(())
    }

    async fn chat_messages(&self, request: &ChatRequest) -> Vec<ChatMessage> {
        let mut system = match request.system_prompt.as_deref().map(str::trim) {
            Some(prompt) if !prompt.is_empty() => Some(prompt.to_string()),
            _ => match request.role_id.as_deref() {
                Some(role_id) => self.roles.system_prompt(role_id).await,
                None => None,
            },
        };

        if !request.table_contexts.is_empty() {
            let contexts = request
                .table_contexts
                .iter()
                .map(render_table_context)
                .collect::<Vec<_>>()
                .join("\n\n");
            let base = system.take().unwrap_or_default();
            system = Some(
                format!("{base}\n\nThe user is working with these tables:\n{contexts}")
                    .trim_start()
                    .to_string(),
            );
        }

        let mut messages = Vec::with_capacity(request.history.len() + 2);
        if let Some(system) = system {
            messages.push(ChatMessage::system(system));
        }
        messages.extend(
            request
                .history
                .iter()
                .filter(|m| !m.content.trim().is_empty())
                .cloned(),
        );
        messages.push(ChatMessage::user(request.message.trim()));
        messages
    }
}

fn required<'a>(value: &'a str, message: &str) -> AiResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AiError::invalid_input(message));
    }
    Ok(value)
}
