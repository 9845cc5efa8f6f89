//! In-memory [`Client`] used by the provider tests

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use rsform_core::resource::Value;

use super::{Client, ClientError, ClientResult, Fields, Locator, RemoteResource};

#[derive(Default)]
struct Inner {
    next_id: u64,
    resources: BTreeMap<Locator, Fields>,
    calls: Vec<String>,
    failing_rcl: Option<String>,
    failing_delete: bool,
    failing_update: bool,
}

/// Fake API that keeps resources in a map, rejects deletion of locked
/// resources and records every call as `"<op> <target>"`
#[derive(Default)]
pub struct MemoryClient {
    inner: Mutex<Inner>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `run` fail for this exact expression
    pub fn fail_rcl(&self, rcl: &str) {
        self.inner.lock().unwrap().failing_rcl = Some(rcl.to_string());
    }

    /// Make every `delete` fail
    pub fn fail_deletes(&self) {
        self.inner.lock().unwrap().failing_delete = true;
    }

    /// Make every `update` fail
    pub fn fail_updates(&self) {
        self.inner.lock().unwrap().failing_update = true;
    }

    /// Store a resource directly, bypassing `create`
    pub fn insert(&self, locator: Locator, fields: Fields) {
        self.inner.lock().unwrap().resources.insert(locator, fields);
    }

    pub fn fields(&self, locator: &Locator) -> Option<Fields> {
        self.inner.lock().unwrap().resources.get(locator).cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().resources.len()
    }
}

#[async_trait]
impl Client for MemoryClient {
    async fn create(
        &self,
        namespace: &str,
        type_name: &str,
        fields: Fields,
    ) -> ClientResult<RemoteResource> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let locator = Locator::new(namespace, format!("/api/{}s/{}", type_name, inner.next_id));
        inner.calls.push(format!("create {}", locator));

        let mut stored = fields;
        stored.entry("locked".to_string()).or_insert(Value::Bool(false));
        stored
            .entry("server_tag_scope".to_string())
            .or_insert_with(|| Value::from("deployment"));
        stored.insert("href".to_string(), Value::from(locator.href.clone()));
        inner.resources.insert(locator.clone(), stored.clone());

        Ok(RemoteResource {
            locator,
            fields: stored,
        })
    }

    async fn get(&self, locator: &Locator) -> ClientResult<RemoteResource> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(format!("get {}", locator));
        let fields = inner
            .resources
            .get(locator)
            .cloned()
            .ok_or(ClientError::NotFound)?;
        Ok(RemoteResource {
            locator: locator.clone(),
            fields,
        })
    }

    async fn update(&self, locator: &Locator, fields: Fields) -> ClientResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(format!("update {}", locator));
        if inner.failing_update {
            return Err(ClientError::Api {
                method: "PUT".to_string(),
                href: locator.href.clone(),
                status: 500,
                message: "update failed".to_string(),
            });
        }
        let stored = inner
            .resources
            .get_mut(locator)
            .ok_or(ClientError::NotFound)?;
        stored.extend(fields);
        Ok(())
    }

    async fn delete(&self, locator: &Locator) -> ClientResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(format!("delete {}", locator));
        if inner.failing_delete {
            return Err(ClientError::Unsupported("delete disabled".to_string()));
        }
        let locked = inner
            .resources
            .get(locator)
            .ok_or(ClientError::NotFound)?
            .get("locked")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if locked {
            return Err(ClientError::Api {
                method: "DELETE".to_string(),
                href: locator.href.clone(),
                status: 422,
                message: "deployment is locked".to_string(),
            });
        }
        inner.resources.remove(locator);
        Ok(())
    }

    async fn run(&self, locator: &Locator, rcl: &str) -> ClientResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(format!("run {} {}", locator, rcl));
        if inner.failing_rcl.as_deref() == Some(rcl) {
            return Err(ClientError::Api {
                method: "POST".to_string(),
                href: locator.href.clone(),
                status: 500,
                message: "action failed".to_string(),
            });
        }
        let locked = match rcl {
            "@res.lock()" => true,
            "@res.unlock()" => false,
            other => return Err(ClientError::Unsupported(format!("RCL expression {:?}", other))),
        };
        let stored = inner
            .resources
            .get_mut(locator)
            .ok_or(ClientError::NotFound)?;
        stored.insert("locked".to_string(), Value::Bool(locked));
        Ok(())
    }
}
