use std::collections::HashMap;

/// Context passed to `Connection::on_open`. Built from the handshake or
/// attach request: remote address, the connect URL's parsed query string,
/// and any cookies sent with the request.
///
/// Grounded in tornadio2's `connect_endpoint`, which parses the connect
/// URL's query string into `final_args` and forwards them as `on_open`
/// kwargs, and `conn.py`'s `on_open(request)` documenting IP/cookie access.
#[derive(Debug, Clone, Default)]
pub struct ConnectionInfo {
    pub remote_addr: Option<String>,
    pub args: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
}

impl ConnectionInfo {
    pub fn new(remote_addr: Option<String>) -> Self {
        Self { remote_addr, args: HashMap::new(), cookies: HashMap::new() }
    }

    /// Splits an endpoint field like `/room?x=1&y=2` into the bare path and
    /// the parsed query args, the way `connect_endpoint` does.
    pub fn split_endpoint_query(endpoint: &str) -> (&str, HashMap<String, String>) {
        match endpoint.split_once('?') {
            None => (endpoint, HashMap::new()),
            Some((path, query)) => {
                let mut args = HashMap::new();
                for pair in query.split('&') {
                    if pair.is_empty() {
                        continue;
                    }
                    match pair.split_once('=') {
                        Some((k, v)) => {
                            args.insert(k.to_owned(), v.to_owned());
                        }
                        None => {
                            args.insert(pair.to_owned(), String::new());
                        }
                    }
                }
                (path, args)
            }
        }
    }
}
