//! Cache key layout. Value keys and lock keys never collide: locks always
//! carry the `lock:` prefix and value keys start with a mode name.

pub fn quick(query: &str, top_k: usize) -> String { format!("quick:{query}:{top_k}") }

pub fn deep(query: &str, faiss_k: usize, rerank_k: usize) -> String { format!("deep:{query}:{faiss_k}:{rerank_k}") }

pub fn lock(key: &str) -> String { format!("lock:{key}") }
