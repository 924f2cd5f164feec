//! Weighted rule table for project detection.
//!
//! Every rule fires at most once per observation except keyword and
//! fingerprint rules, which fire once per distinct match. The raw sum can
//! exceed 1.0 (e.g. a repo page mentioning many technologies) and is clamped
//! to [`MAX_CONFIDENCE`] by the classifier.

/// Upper bound of a signal's confidence
pub const MAX_CONFIDENCE: f32 = 1.0;

/// Default decision threshold for tab page-load classification
pub const DEFAULT_THRESHOLD: f32 = 0.3;

/// Lower threshold used for reports coming straight from the content script
pub const CONTENT_SCRIPT_THRESHOLD: f32 = 0.2;

/// Hosts serving source repositories
pub const REPO_HOSTS: &[&str] = &["github.com", "gitlab.com", "bitbucket.org"];

/// First path segments on repo hosts that are site pages, not owners
pub const REPO_RESERVED_OWNERS: &[&str] = &[
    "about",
    "explore",
    "features",
    "login",
    "marketplace",
    "notifications",
    "orgs",
    "pricing",
    "pulls",
    "search",
    "settings",
    "signup",
    "sponsors",
    "topics",
    "users",
];

/// URL points at `owner/repo` on a repo host
pub const REPO_PATH_WEIGHT: f32 = 0.5;
/// URL is on a repo host but not inside a repository
pub const REPO_HOST_WEIGHT: f32 = 0.4;

/// Ports commonly bound by local dev servers
pub const DEV_PORTS: &[u16] = &[
    1313, 3000, 3001, 4000, 4200, 4321, 5000, 5173, 5500, 8000, 8080, 8081, 8888, 9000,
];

pub const LOCALHOST_DEV_PORT_WEIGHT: f32 = 0.4;
pub const LOCALHOST_WEIGHT: f32 = 0.3;

/// Hostnames treated as the local machine
pub const LOOPBACK_HOSTS: &[&str] = &["localhost", "127.0.0.1", "0.0.0.0", "[::1]", "::1"];

/// Domains that indicate development activity, matched as hostname suffixes
pub const DEV_DOMAINS: &[(&str, f32)] = &[
    ("vercel.app", 0.3),
    ("netlify.app", 0.3),
    ("herokuapp.com", 0.3),
    ("pages.dev", 0.3),
    ("github.io", 0.2),
    ("docs.rs", 0.2),
    ("crates.io", 0.2),
    ("npmjs.com", 0.2),
    ("pypi.org", 0.2),
    ("readthedocs.io", 0.2),
    ("stackoverflow.com", 0.1),
    ("developer.mozilla.org", 0.1),
];

/// Weight of each distinct tech keyword found in title or body
pub const KEYWORD_WEIGHT: f32 = 0.1;

/// Keyword (matched case-insensitively on word boundaries) -> technology
pub const TECH_KEYWORDS: &[(&str, &str)] = &[
    ("react", "React"),
    ("vue", "Vue"),
    ("angular", "Angular"),
    ("svelte", "Svelte"),
    ("next.js", "Next.js"),
    ("nuxt", "Nuxt"),
    ("django", "Django"),
    ("flask", "Flask"),
    ("rails", "Rails"),
    ("laravel", "Laravel"),
    ("express", "Express"),
    ("node.js", "Node.js"),
    ("typescript", "TypeScript"),
    ("javascript", "JavaScript"),
    ("python", "Python"),
    ("rust", "Rust"),
    ("golang", "Go"),
    ("docker", "Docker"),
    ("kubernetes", "Kubernetes"),
    ("graphql", "GraphQL"),
    ("tailwind", "Tailwind CSS"),
    ("spring boot", "Spring"),
];

/// `<meta name="generator">` fingerprints (lowercase substring -> technology)
pub const GENERATOR_FINGERPRINTS: &[(&str, &str)] = &[
    ("next.js", "Next.js"),
    ("gatsby", "Gatsby"),
    ("hugo", "Hugo"),
    ("jekyll", "Jekyll"),
    ("docusaurus", "Docusaurus"),
    ("astro", "Astro"),
    ("vitepress", "VitePress"),
    ("wordpress", "WordPress"),
];

pub const GENERATOR_WEIGHT: f32 = 0.2;

/// Script `src` fingerprints (lowercase substring -> technology, weight)
pub const SCRIPT_FINGERPRINTS: &[(&str, &str, f32)] = &[
    ("/_next/", "Next.js", 0.2),
    ("@vite/client", "Vite", 0.2),
    ("@react-refresh", "React", 0.15),
    ("/_nuxt/", "Nuxt", 0.15),
    ("react", "React", 0.1),
    ("vue", "Vue", 0.1),
    ("angular", "Angular", 0.1),
    ("svelte", "Svelte", 0.1),
    ("webpack", "Webpack", 0.05),
];
