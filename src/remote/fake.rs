//! In-memory [`TodoApi`] for sync engine tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::client::{ApiError, TodoApi};
use crate::model::Todo;

#[derive(Debug, Default)]
pub struct FakeState {
    pub online: bool,
    pub todos: Vec<Todo>,
    /// Status code to answer with for requests touching a task id
    pub reject: HashMap<String, u16>,
    /// Requests received, as `"METHOD id"`
    pub calls: Vec<String>,
    /// How long the connectivity check takes, like a server that doesn't respond
    pub check_delay: Option<Duration>,
}

pub struct FakeApi {
    pub state: Mutex<FakeState>,
}

impl FakeApi {
    pub fn online(todos: Vec<Todo>) -> Self {
        FakeApi {
            state: Mutex::new(FakeState {
                online: true,
                todos,
                ..Default::default()
            }),
        }
    }

    pub fn offline() -> Self {
        FakeApi {
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.state.lock().unwrap().online = online;
    }

    pub fn reject(&self, id: &str, status: u16) {
        self.state.lock().unwrap().reject.insert(id.to_string(), status);
    }

    pub fn set_check_delay(&self, delay: Duration) {
        self.state.lock().unwrap().check_delay = Some(delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn server_todos(&self) -> Vec<Todo> {
        self.state.lock().unwrap().todos.clone()
    }

    /// Record the call and fail if offline or rejected
    fn check(state: &mut FakeState, method: &str, id: &str) -> Result<(), ApiError> {
        if !state.online {
            return Err(ApiError::Offline {
                url: "http://fake/api/Todo".into(),
            });
        }
        state.calls.push(format!("{method} {id}").trim_end().to_string());
        if let Some(status) = state.reject.get(id) {
            return Err(status_error(*status));
        }
        Ok(())
    }
}

fn status_error(status: u16) -> ApiError {
    ApiError::Status {
        url: "http://fake/api/Todo".into(),
        status,
        body: String::new(),
    }
}

#[async_trait]
impl TodoApi for FakeApi {
    async fn list(&self) -> Result<Vec<Todo>, ApiError> {
        let mut state = self.state.lock().unwrap();
        Self::check(&mut state, "GET", "")?;
        Ok(state.todos.clone())
    }

    async fn create(&self, todo: &Todo) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        Self::check(&mut state, "POST", &todo.id)?;
        if state.todos.iter().any(|t| t.id == todo.id) {
            return Err(status_error(409));
        }
        state.todos.push(todo.clone());
        Ok(())
    }

    async fn set_completed(&self, id: &str, is_completed: bool) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        Self::check(&mut state, "PUT", id)?;
        match state.todos.iter_mut().find(|t| t.id == id) {
            Some(todo) => {
                todo.is_completed = is_completed;
                Ok(())
            }
            None => Err(status_error(404)),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        Self::check(&mut state, "DELETE", id)?;
        let before = state.todos.len();
        state.todos.retain(|t| t.id != id);
        if state.todos.len() == before {
            return Err(status_error(404));
        }
        Ok(())
    }

    async fn probe(&self) -> bool {
        let delay = self.state.lock().unwrap().check_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state.lock().unwrap().online
    }
}
