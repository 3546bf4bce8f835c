use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// Process-local map shared between clones.
pub struct Cache<T> {
    data: Arc<Mutex<HashMap<String, T>>>,
}

impl<T> Clone for Cache<T> {
    fn clone(&self) -> Self {
        Cache {
            data: Arc::clone(&self.data),
        }
    }
}

impl<T> Cache<T> {
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn get_connection(&self) -> MutexGuard<'_, HashMap<String, T>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_data(&self, id: &str, data: T) {
        let mut conn = self.get_connection();
        conn.insert(id.to_owned(), data);
    }

    pub fn contains_key(&self, id: &str) -> bool {
        let conn = self.get_connection();
        conn.contains_key(id)
    }

    pub fn update_data<F, O>(&self, id: &str, update: F) -> Option<O>
    where
        F: FnOnce(&mut T) -> O,
    {
        let mut conn = self.get_connection();
        conn.get_mut(id).map(update)
    }

    /// Applies `update` to the entry for `id`, inserting `with()` first when absent.
    pub fn upsert<F, W, O>(&self, id: &str, with: W, update: F) -> O
    where
        W: FnOnce() -> T,
        F: FnOnce(&mut T) -> O,
    {
        let mut conn = self.get_connection();
        update(conn.entry(id.to_owned()).or_insert_with(with))
    }

    pub fn read_data<F, O>(&self, id: &str, read: F) -> Option<O>
    where
        F: FnOnce(&T) -> O,
    {
        let conn = self.get_connection();
        conn.get(id).map(read)
    }

    pub fn delete_data(&self, id: &str) -> Option<T> {
        let mut conn = self.get_connection();
        conn.remove(id)
    }

    /// Removes the entry for `id` only when `predicate` holds for it.
    pub fn delete_if<F>(&self, id: &str, predicate: F) -> Option<T>
    where
        F: FnOnce(&T) -> bool,
    {
        let mut conn = self.get_connection();
        if conn.get(id).is_some_and(predicate) {
            conn.remove(id)
        } else {
            None
        }
    }

    pub fn keys(&self) -> Vec<String> {
        let conn = self.get_connection();
        conn.keys().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.get_connection().len()
    }
}

impl<T: Clone> Cache<T> {
    pub fn get_data(&self, id: &str) -> Option<T> {
        let conn = self.get_connection();
        conn.get(id).cloned()
    }
}

impl<T> Default for Cache<T> {
    fn default() -> Self {
        Self::new()
    }
}
