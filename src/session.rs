use crate::catalog::Catalog;
use crate::collections;
use crate::error::Result;
use crate::executor::Executor;
use crate::interpreter::{Interpreter, LanguageModel};
use crate::normalize::normalize;
use crate::render::Renderer;
use crate::tokens::has_token;
use log::{debug, warn};

const EXIT_WORDS: [&str; 2] = ["exit", "quit"];
const NO_INTENT: &str = "Sorry, I couldn't turn that into a request. Please try rephrasing it.";

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Exit,
    Text(String),
}

pub struct Session<'a, M, C> {
    db: &'a sled::Db,
    catalog: &'a C,
    interpreter: Interpreter<M>,
    renderer: Renderer,
}

impl<'a, M: LanguageModel, C: Catalog> Session<'a, M, C> {
    pub fn new(db: &'a sled::Db, catalog: &'a C, interpreter: Interpreter<M>) -> Result<Self> {
        Ok(Session {
            db,
            catalog,
            interpreter,
            renderer: Renderer::new()?,
        })
    }

    pub fn respond(&self, prompt: &str) -> Result<Reply> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Ok(Reply::Text(String::new()));
        }
        if EXIT_WORDS.contains(&prompt.to_lowercase().as_str()) {
            return Ok(Reply::Exit);
        }
        if has_token(prompt, "collections")
            && (has_token(prompt, "show") || has_token(prompt, "list"))
        {
            return Ok(Reply::Text(self.renderer.collections()?));
        }

        let descriptor = match self.interpreter.interpret(prompt) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                warn!("could not interpret '{}': {}", prompt, err);
                return Ok(Reply::Text(NO_INTENT.to_owned()));
            }
        };
        let collection = match collections::resolve(&descriptor.collection) {
            Ok(collection) => collection,
            Err(err) => return Ok(Reply::Text(self.renderer.unknown_collection(&err)?)),
        };
        let descriptor = normalize(descriptor, prompt);
        debug!("executing {:?} on {}", descriptor.action, collection);

        let mut reply = self.renderer.interpretation(collection, &descriptor)?;
        let outcome = Executor::new(self.db, self.catalog).execute(collection, descriptor.action)?;
        reply.push('\n');
        reply.push_str(&self.renderer.outcome(&outcome)?);
        Ok(Reply::Text(reply))
    }
}
