//! Document loading by URI scheme.
//!
//! A [`LoaderRegistry`] maps URI schemes to [`Loader`] implementations. The
//! default registry reads `file:` URLs from disk and fetches `http(s):` URLs
//! with a blocking client, each wrapped in a [`CachedLoader`] so a document
//! (or a failure) is fetched at most once per run.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use url::Url;

use crate::error::{LoadError, ResolveError};

#[cfg(feature = "remote")]
use std::sync::OnceLock;
#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Something that can fetch the raw bytes of a document.
///
/// Implementations fully drain and close whatever they read from before
/// returning, so no handle outlives the call.
pub trait Loader: Send + Sync {
    /// Returns the content located at `uri`.
    fn load(&self, uri: &Url) -> Result<Vec<u8>, LoadError>;
}

/// Loads `file:` URLs from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

impl FileLoader {
    pub fn new() -> Self {
        FileLoader
    }
}

impl Loader for FileLoader {
    fn load(&self, uri: &Url) -> Result<Vec<u8>, LoadError> {
        let path = uri.to_file_path().map_err(|()| LoadError::InvalidPath {
            uri: uri.to_string(),
        })?;

        std::fs::read(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                LoadError::FileNotFound { path }
            } else {
                LoadError::Read {
                    path,
                    source: Arc::new(source),
                }
            }
        })
    }
}

/// Loads `http:` and `https:` URLs with a blocking GET.
///
/// Any status other than `200 OK` is an error. One client is shared by
/// every request the loader makes.
#[cfg(feature = "remote")]
#[derive(Debug, Clone)]
pub struct HttpLoader {
    client: OnceLock<reqwest::blocking::Client>,
    timeout: Duration,
}

#[cfg(feature = "remote")]
impl HttpLoader {
    /// Loader that builds its own client with the default timeout on first use.
    pub fn new() -> Self {
        HttpLoader {
            client: OnceLock::new(),
            timeout: HTTP_TIMEOUT,
        }
    }

    /// Loader that issues every request through `client`.
    pub fn with_client(client: reqwest::blocking::Client) -> Self {
        HttpLoader {
            client: OnceLock::from(client),
            timeout: HTTP_TIMEOUT,
        }
    }

    /// Set the timeout of the loader's own client. Ignored once a client
    /// exists.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn client(&self, url: &str) -> Result<&reqwest::blocking::Client, LoadError> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|source| LoadError::transport(url, source))?;
        Ok(self.client.get_or_init(|| client))
    }
}

#[cfg(feature = "remote")]
impl Default for HttpLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "remote")]
impl Loader for HttpLoader {
    fn load(&self, uri: &Url) -> Result<Vec<u8>, LoadError> {
        let url = uri.as_str();
        let response = self
            .client(url)?
            .get(url)
            .send()
            .map_err(|source| LoadError::transport(url, source))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(LoadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        // `bytes` drains and consumes the response, releasing the connection.
        response
            .bytes()
            .map(|body| body.to_vec())
            .map_err(|source| LoadError::transport(url, source))
    }
}

/// Memoizes the results of another loader, failures included.
pub struct CachedLoader<L> {
    loader: L,
    results: Mutex<HashMap<String, Result<Vec<u8>, LoadError>>>,
}

impl<L: Loader> CachedLoader<L> {
    pub fn new(loader: L) -> Self {
        CachedLoader {
            loader,
            results: Mutex::new(HashMap::new()),
        }
    }
}

impl<L: Loader> Loader for CachedLoader<L> {
    fn load(&self, uri: &Url) -> Result<Vec<u8>, LoadError> {
        // The lock is held across the inner load so concurrent callers
        // never fetch the same URI twice.
        let mut results = self.results.lock().unwrap_or_else(PoisonError::into_inner);
        results
            .entry(uri.to_string())
            .or_insert_with(|| self.loader.load(uri))
            .clone()
    }
}

/// Scheme → loader dispatch table.
///
/// The empty scheme is treated as `file`.
#[derive(Clone, Default)]
pub struct LoaderRegistry {
    loaders: HashMap<String, Arc<dyn Loader>>,
}

impl LoaderRegistry {
    /// Registry with no loaders at all.
    pub fn empty() -> Self {
        LoaderRegistry {
            loaders: HashMap::new(),
        }
    }

    /// Registry with cached file (and, with the `remote` feature, HTTP) loaders.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(CachedLoader::new(FileLoader::new())), &["", "file"]);
        #[cfg(feature = "remote")]
        registry.register(
            Arc::new(CachedLoader::new(HttpLoader::new())),
            &["http", "https"],
        );
        registry
    }

    /// Register `loader` for each of `schemes`, replacing existing entries.
    pub fn register(&mut self, loader: Arc<dyn Loader>, schemes: &[&str]) {
        for scheme in schemes {
            self.loaders.insert(scheme.to_string(), Arc::clone(&loader));
        }
    }

    pub fn unregister(&mut self, scheme: &str) {
        self.loaders.remove(scheme);
    }

    /// Returns the loader registered for `scheme`.
    pub fn registered(&self, scheme: &str) -> Option<Arc<dyn Loader>> {
        self.loaders.get(scheme).cloned()
    }

    /// Load `uri` with the loader registered for its scheme.
    pub fn load(&self, uri: &Url) -> Result<Vec<u8>, LoadError> {
        let loader = self
            .loaders
            .get(uri.scheme())
            .ok_or_else(|| LoadError::UnknownScheme {
                scheme: uri.scheme().to_string(),
            })?;
        loader.load(uri)
    }
}

impl std::fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut schemes: Vec<&str> = self.loaders.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        f.debug_struct("LoaderRegistry")
            .field("schemes", &schemes)
            .finish()
    }
}

/// Normalize a schema location into an absolute URL.
///
/// Absolute URLs pass through unchanged. Anything else is a filesystem path,
/// made absolute against the working directory and turned into a `file:`
/// URL; a `#fragment` suffix is carried over. Empty fragments are dropped
/// so `schema.json#` and `schema.json` name the same document.
pub fn location_url(location: &str) -> Result<Url, ResolveError> {
    match Url::parse(location) {
        // Single-letter schemes are Windows drive letters, not URLs.
        Ok(url) if url.scheme().len() > 1 => Ok(without_empty_fragment(url)),
        Ok(_) | Err(url::ParseError::RelativeUrlWithoutBase) => path_url(location),
        Err(source) => Err(ResolveError::InvalidReference {
            reference: location.to_string(),
            message: source.to_string(),
        }),
    }
}

fn path_url(location: &str) -> Result<Url, ResolveError> {
    let (path, fragment) = match location.find('#') {
        Some(idx) => (&location[..idx], Some(&location[idx + 1..])),
        None => (location, None),
    };

    let invalid = |message: String| ResolveError::InvalidReference {
        reference: location.to_string(),
        message,
    };

    let path = Path::new(path);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| invalid(format!("cannot determine working directory: {}", e)))?
            .join(path)
    };

    let mut url = Url::from_file_path(&absolute)
        .map_err(|()| invalid("not a valid file path".to_string()))?;
    url.set_fragment(fragment);
    Ok(without_empty_fragment(url))
}

/// Drop a trailing `#` with nothing after it.
pub(crate) fn without_empty_fragment(mut url: Url) -> Url {
    if url.fragment() == Some("") {
        url.set_fragment(None);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::NamedTempFile;

    /// Loader that counts calls and always returns the same result.
    struct CountingLoader {
        calls: AtomicUsize,
        result: Result<Vec<u8>, LoadError>,
    }

    impl Loader for CountingLoader {
        fn load(&self, _uri: &Url) -> Result<Vec<u8>, LoadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    impl Loader for Arc<CountingLoader> {
        fn load(&self, uri: &Url) -> Result<Vec<u8>, LoadError> {
            self.as_ref().load(uri)
        }
    }

    fn counting(result: Result<Vec<u8>, LoadError>) -> Arc<CountingLoader> {
        Arc::new(CountingLoader {
            calls: AtomicUsize::new(0),
            result,
        })
    }

    #[test]
    fn file_loader_reads_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"type": "object"}}"#).unwrap();

        let uri = Url::from_file_path(file.path()).unwrap();
        let content = FileLoader::new().load(&uri).unwrap();
        assert_eq!(content, br#"{"type": "object"}"#);
    }

    #[test]
    fn file_loader_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let uri = Url::from_file_path(dir.path().join("missing.json")).unwrap();

        let result = FileLoader::new().load(&uri);
        assert!(matches!(result, Err(LoadError::FileNotFound { .. })));
    }

    #[test]
    fn cached_loader_memoizes_content() {
        let inner = counting(Ok(b"{}".to_vec()));
        let cached = CachedLoader::new(Arc::clone(&inner));
        let uri = Url::parse("https://example.com/a.json").unwrap();

        assert_eq!(cached.load(&uri).unwrap(), b"{}");
        assert_eq!(cached.load(&uri).unwrap(), b"{}");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        let other = Url::parse("https://example.com/b.json").unwrap();
        cached.load(&other).unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cached_loader_memoizes_errors() {
        let inner = counting(Err(LoadError::Status {
            url: "https://example.com/a.json".into(),
            status: 503,
        }));
        let cached = CachedLoader::new(Arc::clone(&inner));
        let uri = Url::parse("https://example.com/a.json").unwrap();

        assert!(matches!(
            cached.load(&uri),
            Err(LoadError::Status { status: 503, .. })
        ));
        assert!(matches!(
            cached.load(&uri),
            Err(LoadError::Status { status: 503, .. })
        ));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn registry_dispatches_by_scheme() {
        let mut registry = LoaderRegistry::empty();
        assert!(registry.registered("foo").is_none());

        registry.register(counting(Ok(b"{}".to_vec())), &["foo", "bar"]);
        assert!(registry.registered("foo").is_some());
        assert!(registry.registered("bar").is_some());

        let uri = Url::parse("foo://something").unwrap();
        assert_eq!(registry.load(&uri).unwrap(), b"{}");

        registry.unregister("foo");
        assert!(registry.registered("foo").is_none());
        assert!(registry.registered("bar").is_some());
    }

    #[test]
    fn registry_unknown_scheme() {
        let registry = LoaderRegistry::empty();
        let uri = Url::parse("nope://something").unwrap();

        let err = registry.load(&uri).unwrap_err();
        assert!(matches!(err, LoadError::UnknownScheme { ref scheme } if scheme == "nope"));
        assert_eq!(err.to_string(), "unknown scheme: nope");
    }

    #[test]
    fn default_registry_schemes() {
        let registry = LoaderRegistry::with_defaults();
        assert!(registry.registered("").is_some());
        assert!(registry.registered("file").is_some());
        #[cfg(feature = "remote")]
        {
            assert!(registry.registered("http").is_some());
            assert!(registry.registered("https").is_some());
        }
    }

    #[test]
    fn location_url_passes_urls_through() {
        let url = location_url("https://example.com/s.json#/definitions/foo").unwrap();
        assert_eq!(url.as_str(), "https://example.com/s.json#/definitions/foo");
    }

    #[test]
    fn location_url_drops_empty_fragment() {
        let url = location_url("https://example.com/s.json#").unwrap();
        assert_eq!(url.as_str(), "https://example.com/s.json");
    }

    #[test]
    fn location_url_converts_relative_paths() {
        let url = location_url("testdata/basic.schema.json").unwrap();
        assert_eq!(url.scheme(), "file");

        let expected = std::env::current_dir()
            .unwrap()
            .join("testdata/basic.schema.json");
        assert_eq!(url.to_file_path().unwrap(), expected);
    }

    #[test]
    fn location_url_keeps_path_fragment() {
        let url = location_url("testdata/basic.schema.json#/definitions/foo").unwrap();
        assert_eq!(url.fragment(), Some("/definitions/foo"));
    }

    #[cfg(feature = "remote")]
    mod remote {
        use super::*;

        #[test]
        fn http_loader_ok() {
            let mut server = mockito::Server::new();
            let mock = server
                .mock("GET", "/foo.schema.json")
                .with_status(200)
                .with_body("{}")
                .create();

            let uri = Url::parse(&format!("{}/foo.schema.json", server.url())).unwrap();
            let content = HttpLoader::new().load(&uri).unwrap();
            assert_eq!(content, b"{}");
            mock.assert();
        }

        #[test]
        fn http_loader_404() {
            let mut server = mockito::Server::new();
            let mock = server
                .mock("GET", "/foo.schema.json")
                .with_status(404)
                .with_body("{}")
                .create();

            let uri = Url::parse(&format!("{}/foo.schema.json", server.url())).unwrap();
            let err = HttpLoader::new().load(&uri).unwrap_err();
            assert!(matches!(err, LoadError::Status { status: 404, .. }));
            assert!(err.to_string().contains("returned status code 404"));
            mock.assert();
        }

        #[test]
        fn http_loader_transport_error() {
            // Nothing listens on port 9 (discard) on test hosts.
            let uri = Url::parse("http://127.0.0.1:9/foo.schema.json").unwrap();
            let loader = HttpLoader::new().timeout(Duration::from_secs(2));

            let err = loader.load(&uri).unwrap_err();
            assert!(matches!(err, LoadError::Transport { .. }));
        }

        #[test]
        fn http_loader_reuses_client() {
            let loader = HttpLoader::new();
            let first: *const reqwest::blocking::Client = loader.client("http://a").unwrap();
            let second: *const reqwest::blocking::Client = loader.client("http://b").unwrap();
            assert_eq!(first, second);
        }

        #[test]
        fn http_loader_serves_repeated_requests() {
            let mut server = mockito::Server::new();
            let mock = server
                .mock("GET", "/foo.schema.json")
                .with_status(200)
                .with_body("{}")
                .expect(2)
                .create();

            let uri = Url::parse(&format!("{}/foo.schema.json", server.url())).unwrap();
            let loader = HttpLoader::new();
            assert_eq!(loader.load(&uri).unwrap(), b"{}");
            assert_eq!(loader.load(&uri).unwrap(), b"{}");
            mock.assert();
        }
    }
}
