use crate::config::Config;
use crate::descriptor::{extract_json, Descriptor, DescriptorError};
use log::{info, warn};
use serde::Deserialize;
use std::thread;
use std::time::Duration;

pub const SYSTEM_PROMPT: &str = r#"
Always extract 'user' and 'movie' names precisely, even if they are in possessive or embedded form like "user DCSI" or "DCSI's wishlist".
You are an intelligent assistant that converts natural language movie-related requests into MongoDB-style JSON queries.
- If director is a partial name like "Nolan", assume full name "Christopher Nolan".

Your task:
- Only respond with **valid JSON**, with fields:
  - collection (string, one of 'users', 'movies', 'wishlist', 'watched')
  - action (one of 'find', 'insert', 'update', 'delete', 'count')
  - query (object)
  - sort (object, optional)
  - limit (integer, optional)
  - data (object, optional; used for insert or update)

Guidelines:
- Interpret 'watchlist' as 'wishlist'.
- Fix simple typos (e.g., 'moviees' -> 'movies', 'watched list' -> 'watched').
- Infer missing fields if obvious from user intent (e.g., 'show all users' implies collection='users', action='find', query={}).
- Never return anything other than the JSON itself.

Examples:

Input: "Top 5 thriller movies after 2020"
Output:
{
  "collection": "movies",
  "action": "find",
  "query": { "genre": "Thriller", "release_year": { "$gt": 2020 } },
  "sort": { "rating": -1 },
  "limit": 5
}

Input: "Alice wants to see Joker"
Output:
{
  "collection": "wishlist",
  "action": "insert",
  "data": { "user": "Alice", "movie": "Joker" }
}

Input: "Jinyi watched Inception and gave 9.5"
Output:
{
  "collection": "watched",
  "action": "insert",
  "data": { "user": "Jinyi", "movie": "Inception", "rating": 9.5 }
}

Input: "Delete all movies"
Output:
{
  "collection": "movies",
  "action": "delete",
  "query": {}
}

Input: "Update rating of Dune to 8.7"
Output:
{
  "collection": "movies",
  "action": "update",
  "query": { "title": "Dune" },
  "data": { "rating": 8.7 }
}

Input: "Show all users"
Output:
{
  "collection": "users",
  "action": "find",
  "query": {}
}

Input: "User DCSI wants to see Joker"
Output:
{
  "collection": "wishlist",
  "action": "insert",
  "data": { "user": "DCSI", "movie": "Joker" }
}

Input: "Add Joker to the wishlist of user Jasper"
Output:
{
  "collection": "wishlist",
  "action": "insert",
  "data": { "user": "Jasper", "movie": "Joker" }
}

Input: "Add Joker to DCSI's wishlist"
Output:
{
  "collection": "wishlist",
  "action": "insert",
  "data": { "user": "DCSI", "movie": "Joker" }
}

Input: "Show Jinyi's watched history"
Output:
{
  "collection": "watched",
  "action": "find",
  "query": { "user": "Jinyi" }
}

Input: "Update Jasper's age to 1"
Output:
{
  "collection": "users",
  "action": "update",
  "query": { "username": "Jasper" },
  "data": { "age": 1 }
}
"#;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("model API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response shape: {0}")]
    Malformed(String),
}

impl ModelError {
    /// Transport failures and error statuses are worth another attempt; a
    /// successful reply we can't read is not.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ModelError::Malformed(_))
    }
}

pub trait LanguageModel {
    fn complete(&self, system: &str, prompt: &str) -> Result<String, ModelError>;
}

impl<M: LanguageModel + ?Sized> LanguageModel for &M {
    fn complete(&self, system: &str, prompt: &str) -> Result<String, ModelError> {
        (**self).complete(system, prompt)
    }
}

pub struct OpenAiClient {
    client: reqwest::blocking::Client,
    url: String,
    api_key: String,
    model: String,
}

const TEMPERATURE: f64 = 0.2;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

impl OpenAiClient {
    pub fn new(config: &Config) -> crate::error::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| crate::error::Error::Config(err.to_string()))?;
        Ok(OpenAiClient {
            client,
            url: config.openai_url.clone(),
            api_key: config.openai_api_key.clone(),
            model: config.openai_model.clone(),
        })
    }
}

#[derive(Deserialize)]
struct Message {
    content: String,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

fn request_body(model: &str, system: &str, prompt: &str) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "messages": [
            {"role": "system", "content": system},
            {"role": "user", "content": prompt}
        ],
        "temperature": TEMPERATURE
    })
}

fn reply_content(text: &str) -> Result<String, ModelError> {
    let parsed: ChatResponse =
        serde_json::from_str(text).map_err(|err| ModelError::Malformed(err.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| ModelError::Malformed("no choices".to_owned()))
}

impl LanguageModel for OpenAiClient {
    fn complete(&self, system: &str, prompt: &str) -> Result<String, ModelError> {
        let body = request_body(&self.model, system, prompt);
        let response = self
            .client
            .post(self.url.as_str())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|err| ModelError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let text = response
            .text()
            .map_err(|err| ModelError::Transport(err.to_string()))?;
        reply_content(&text)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InterpretError {
    #[error("language model unavailable after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: ModelError },
    #[error("language model reply was unusable: {0}")]
    Unreadable(ModelError),
    #[error("no JSON object in the model reply")]
    NoJson,
    #[error("model reply is not valid JSON: {0}")]
    InvalidJson(String),
    #[error(transparent)]
    Invalid(#[from] DescriptorError),
}

pub const ATTEMPTS: u32 = 3;
pub const BACKOFF: Duration = Duration::from_secs(1);

pub struct Interpreter<M> {
    model: M,
    attempts: u32,
    backoff: Duration,
}

impl<M: LanguageModel> Interpreter<M> {
    pub fn new(model: M) -> Self {
        Interpreter {
            model,
            attempts: ATTEMPTS,
            backoff: BACKOFF,
        }
    }

    #[cfg(test)]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn interpret(&self, prompt: &str) -> Result<Descriptor, InterpretError> {
        info!("interpreting: {}", prompt);
        let reply = self.ask(prompt)?;
        let json = extract_json(&reply).ok_or(InterpretError::NoJson)?;
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|err| InterpretError::InvalidJson(err.to_string()))?;
        Ok(Descriptor::from_json(value)?)
    }

    fn ask(&self, prompt: &str) -> Result<String, InterpretError> {
        let mut attempt = 1;
        loop {
            match self.model.complete(SYSTEM_PROMPT, prompt) {
                Ok(reply) => return Ok(reply),
                Err(err) if !err.is_retryable() => return Err(InterpretError::Unreadable(err)),
                Err(err) if attempt >= self.attempts => {
                    return Err(InterpretError::Exhausted {
                        attempts: attempt,
                        last: err,
                    })
                }
                Err(err) => {
                    warn!("model request failed on attempt {}: {}", attempt, err);
                    thread::sleep(self.backoff);
                    attempt += 1;
                }
            }
        }
    }
}
