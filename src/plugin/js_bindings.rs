//! JavaScript bindings for the scraper sandbox
//!
//! This module provides the bridge between Rust and sandboxed scraper code:
//! - Native ops (fetch, URL parsing, DOM handles, crypto helpers, console, result capture)
//! - The prelude that builds web-like globals on top of those ops
//! - The module wrapper and invoker used to load and call untrusted code
//!
//! Every op is total: failures are encoded in the returned value and nothing
//! is thrown back into the interpreter.

use anyhow::{Context, Result};
use deno_core::{op2, v8, Extension, JsRuntime, Op, OpState, RuntimeOptions};
use std::borrow::Cow;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

use super::crypto;
use super::dom::DomArena;
use super::http::{parse_url, BridgeHttp, FetchEnvelope};
use super::sandbox::{CaptureSlot, Captured, InFlightCalls, ResourceLimits};
use crate::core::error::ScraperError;

/// State shared by all ops of one execution
pub struct BridgeState {
    pub scraper_id: String,
    pub http: BridgeHttp,
    pub calls: InFlightCalls,
    pub capture: CaptureSlot,
    pub dom: DomArena,
}

impl BridgeState {
    pub fn new(scraper_id: &str, http: BridgeHttp) -> Self {
        Self {
            scraper_id: scraper_id.to_string(),
            http,
            calls: InFlightCalls::new(),
            capture: CaptureSlot::new(),
            dom: DomArena::new(),
        }
    }
}

// ============================================================================
// Network
// ============================================================================

#[op2(async)]
#[string]
pub async fn op_fetch(
    state: Rc<RefCell<OpState>>,
    #[string] url: String,
    #[string] method: String,
    #[string] headers: String,
    #[string] body: String,
) -> String {
    let bridge = {
        let state = state.borrow();
        state
            .try_borrow::<BridgeState>()
            .map(|s| (s.http.clone(), s.calls.clone(), s.scraper_id.clone()))
    };
    let Some((http, calls, scraper_id)) = bridge else {
        let err = ScraperError::BridgeProtocol("bridge state missing".to_string());
        return FetchEnvelope::failure(&url, &err).to_json();
    };

    debug!(scraper_id = %scraper_id, url = %url, method = %method, "Script fetch");
    let body = if body.is_empty() { None } else { Some(body) };

    match calls.run(http.fetch(&url, &method, &headers, body)).await {
        Some(envelope) => envelope.to_json(),
        None => {
            let err = ScraperError::Timeout("request cancelled".to_string());
            FetchEnvelope::failure(&url, &err).to_json()
        }
    }
}

/// Timer backing for setTimeout; resolves false when cancelled
#[op2(async)]
pub async fn op_sleep(state: Rc<RefCell<OpState>>, ms: u32) -> bool {
    let calls = state.borrow().try_borrow::<BridgeState>().map(|s| s.calls.clone());
    let Some(calls) = calls else {
        return false;
    };
    calls
        .run(tokio::time::sleep(Duration::from_millis(ms as u64)))
        .await
        .is_some()
}

#[op2]
#[string]
pub fn op_parse_url(#[string] url: String, #[string] base: String) -> String {
    parse_url(&url, Some(base.as_str()))
}

// ============================================================================
// DOM handles
// ============================================================================

#[op2]
#[string]
pub fn op_dom_load(state: &mut OpState, #[string] html: String) -> String {
    match state.try_borrow_mut::<BridgeState>() {
        Some(bridge) => bridge.dom.load(&html),
        None => String::new(),
    }
}

#[op2]
#[serde]
pub fn op_dom_select(state: &mut OpState, #[string] handle: String, #[string] selector: String) -> Vec<String> {
    state
        .try_borrow::<BridgeState>()
        .map(|bridge| bridge.dom.select(&handle, &selector))
        .unwrap_or_default()
}

#[op2]
#[serde]
pub fn op_dom_find(state: &mut OpState, #[serde] handles: Vec<String>, #[string] selector: String) -> Vec<String> {
    state
        .try_borrow::<BridgeState>()
        .map(|bridge| bridge.dom.find(&handles, &selector))
        .unwrap_or_default()
}

#[op2]
#[string]
pub fn op_dom_text(state: &mut OpState, #[serde] handles: Vec<String>) -> String {
    state
        .try_borrow::<BridgeState>()
        .map(|bridge| bridge.dom.text(&handles))
        .unwrap_or_default()
}

#[op2]
#[string]
pub fn op_dom_html(state: &mut OpState, #[serde] handles: Vec<String>) -> String {
    state
        .try_borrow::<BridgeState>()
        .map(|bridge| bridge.dom.html(&handles))
        .unwrap_or_default()
}

#[op2]
#[string]
pub fn op_dom_outer_html(state: &mut OpState, #[serde] handles: Vec<String>) -> String {
    state
        .try_borrow::<BridgeState>()
        .map(|bridge| bridge.dom.outer_html(&handles))
        .unwrap_or_default()
}

#[op2]
#[string]
pub fn op_dom_attr(state: &mut OpState, #[string] handle: String, #[string] name: String) -> String {
    state
        .try_borrow::<BridgeState>()
        .map(|bridge| bridge.dom.attr(&handle, &name))
        .unwrap_or_else(|| super::dom::ATTR_ABSENT.to_string())
}

/// Next element sibling, or an empty string
#[op2]
#[string]
pub fn op_dom_next(state: &mut OpState, #[string] handle: String) -> String {
    state
        .try_borrow::<BridgeState>()
        .and_then(|bridge| bridge.dom.next(&handle))
        .unwrap_or_default()
}

#[op2]
#[string]
pub fn op_dom_prev(state: &mut OpState, #[string] handle: String) -> String {
    state
        .try_borrow::<BridgeState>()
        .and_then(|bridge| bridge.dom.prev(&handle))
        .unwrap_or_default()
}

#[op2]
#[string]
pub fn op_dom_parent(state: &mut OpState, #[string] handle: String) -> String {
    state
        .try_borrow::<BridgeState>()
        .and_then(|bridge| bridge.dom.parent(&handle))
        .unwrap_or_default()
}

#[op2]
#[serde]
pub fn op_dom_children(state: &mut OpState, #[string] handle: String) -> Vec<String> {
    state
        .try_borrow::<BridgeState>()
        .map(|bridge| bridge.dom.children(&handle))
        .unwrap_or_default()
}

// ============================================================================
// Crypto helpers
// ============================================================================

#[op2]
#[string]
pub fn op_crypto_convert(#[string] data: String, #[string] from: String, #[string] to: String) -> String {
    crypto::convert(&data, &from, &to).unwrap_or_else(|e| {
        debug!(error = %e, "Crypto conversion failed");
        String::new()
    })
}

#[op2]
#[string]
pub fn op_crypto_digest(#[string] algorithm: String, #[string] input_hex: String) -> String {
    crypto::digest(&algorithm, &input_hex).unwrap_or_else(|e| {
        debug!(error = %e, "Crypto digest failed");
        String::new()
    })
}

// ============================================================================
// Console and result capture
// ============================================================================

#[op2(fast)]
pub fn op_console(state: &mut OpState, #[string] level: String, #[string] message: String) {
    let scraper_id = state
        .try_borrow::<BridgeState>()
        .map(|s| s.scraper_id.as_str())
        .unwrap_or("unknown");

    match level.as_str() {
        "error" => error!(target: "scraper_console", scraper_id = %scraper_id, "{}", message),
        "warn" => warn!(target: "scraper_console", scraper_id = %scraper_id, "{}", message),
        "info" => info!(target: "scraper_console", scraper_id = %scraper_id, "{}", message),
        "trace" => trace!(target: "scraper_console", scraper_id = %scraper_id, "{}", message),
        _ => debug!(target: "scraper_console", scraper_id = %scraper_id, "{}", message),
    }
}

/// Terminal write from the invoker; only the first call per execution counts
#[op2(fast)]
pub fn op_capture_result(state: &mut OpState, #[string] kind: String, #[string] payload: String) -> bool {
    let Some(bridge) = state.try_borrow::<BridgeState>() else {
        return false;
    };
    let captured = match kind.as_str() {
        "resolved" => Captured::Resolved(payload),
        "missing" => Captured::Missing,
        _ => Captured::Rejected(payload),
    };
    bridge.capture.capture(captured)
}

// ============================================================================
// Script-side prelude
// ============================================================================

/// Web-like globals built on the ops above
const PRELUDE: &str = r#"
"use strict";
(function () {
    const ops = Deno.core.ops;
    const UNDEFINED = '__UNDEFINED__';

    // ---- console -------------------------------------------------------
    const stringify = (v) => {
        if (typeof v === 'string') return v;
        if (v instanceof Error) return v.stack || String(v);
        try { return JSON.stringify(v); } catch (_) { return String(v); }
    };
    const logger = (level) => (...args) => ops.op_console(level, args.map(stringify).join(' '));
    globalThis.console = {
        log: logger('debug'),
        debug: logger('debug'),
        info: logger('info'),
        warn: logger('warn'),
        error: logger('error'),
        trace: logger('trace'),
    };

    // ---- timers --------------------------------------------------------
    let nextTimer = 1;
    const timers = new Set();
    const delay = (ms, min) => Math.min(2147483647, Math.max(min, Math.floor(Number(ms) || 0)));
    globalThis.setTimeout = (fn, ms, ...args) => {
        const id = nextTimer++;
        timers.add(id);
        ops.op_sleep(delay(ms, 0)).then((fired) => {
            if (fired && timers.delete(id) && typeof fn === 'function') fn(...args);
        });
        return id;
    };
    globalThis.clearTimeout = (id) => { timers.delete(id); };
    globalThis.setInterval = (fn, ms, ...args) => {
        const id = nextTimer++;
        timers.add(id);
        const tick = () => ops.op_sleep(delay(ms, 1)).then((fired) => {
            if (!fired || !timers.has(id)) return;
            fn(...args);
            tick();
        });
        tick();
        return id;
    };
    globalThis.clearInterval = globalThis.clearTimeout;

    // ---- base64 --------------------------------------------------------
    globalThis.atob = (s) => ops.op_crypto_convert(String(s), 'base64', 'latin1');
    globalThis.btoa = (s) => ops.op_crypto_convert(String(s), 'latin1', 'base64');

    // ---- Headers / fetch -----------------------------------------------
    class Headers {
        constructor(init) {
            this.map = new Map();
            if (!init) return;
            if (init instanceof Headers) {
                init.forEach((value, key) => this.append(key, value));
            } else if (Array.isArray(init)) {
                init.forEach(([key, value]) => this.append(key, value));
            } else {
                Object.keys(init).forEach((key) => this.append(key, init[key]));
            }
        }
        append(name, value) {
            name = String(name).toLowerCase();
            const existing = this.map.get(name);
            this.map.set(name, existing ? existing + ', ' + String(value) : String(value));
        }
        delete(name) { this.map.delete(String(name).toLowerCase()); }
        get(name) {
            const value = this.map.get(String(name).toLowerCase());
            return value === undefined ? null : value;
        }
        has(name) { return this.map.has(String(name).toLowerCase()); }
        set(name, value) { this.map.set(String(name).toLowerCase(), String(value)); }
        forEach(callback, thisArg) {
            for (const [name, value] of this.map) callback.call(thisArg, value, name, this);
        }
        entries() { return this.map.entries(); }
        keys() { return this.map.keys(); }
        values() { return this.map.values(); }
        [Symbol.iterator]() { return this.map.entries(); }
        toObject() { return Object.fromEntries(this.map); }
    }
    globalThis.Headers = Headers;

    globalThis.fetch = async function (input, options) {
        options = options || {};
        const url = typeof input === 'string' ? input : (input && (input.href || input.url)) || String(input);
        const method = String(options.method || 'GET');
        const headers = options.headers instanceof Headers
            ? options.headers.toObject()
            : (options.headers || {});
        let body = options.body;
        if (body === undefined || body === null) {
            body = '';
        } else if (body instanceof URLSearchParams) {
            body = body.toString();
        } else if (typeof body !== 'string') {
            body = JSON.stringify(body);
        }

        const raw = await ops.op_fetch(String(url), method, JSON.stringify(headers), body);
        let envelope;
        try {
            envelope = JSON.parse(raw);
        } catch (_) {
            envelope = { ok: false, status: 0, statusText: 'malformed envelope', url: url, body: '', headers: {} };
        }
        const text = envelope.body || '';
        return {
            ok: !!envelope.ok,
            status: envelope.status,
            statusText: envelope.statusText,
            url: envelope.url,
            redirected: envelope.url !== url,
            headers: new Headers(envelope.headers || {}),
            text: async () => text,
            json: async () => JSON.parse(text),
        };
    };

    // ---- URLSearchParams / URL -----------------------------------------
    const decode = (s) => {
        try { return decodeURIComponent(s.replace(/\+/g, ' ')); } catch (_) { return s; }
    };
    const encode = (s) => encodeURIComponent(s).replace(/%20/g, '+');

    class URLSearchParams {
        constructor(init) {
            this.list = [];
            if (init === undefined || init === null) return;
            if (init instanceof URLSearchParams) {
                this.list = init.list.map(([k, v]) => [k, v]);
            } else if (Array.isArray(init)) {
                init.forEach(([k, v]) => this.append(k, v));
            } else if (typeof init === 'object') {
                Object.keys(init).forEach((k) => this.append(k, init[k]));
            } else {
                String(init).replace(/^\?/, '').split('&').filter(Boolean).forEach((pair) => {
                    const idx = pair.indexOf('=');
                    const key = idx >= 0 ? pair.slice(0, idx) : pair;
                    const value = idx >= 0 ? pair.slice(idx + 1) : '';
                    this.list.push([decode(key), decode(value)]);
                });
            }
        }
        append(k, v) { this.list.push([String(k), String(v)]); }
        delete(k) { this.list = this.list.filter(([key]) => key !== String(k)); }
        get(k) { const hit = this.list.find(([key]) => key === String(k)); return hit ? hit[1] : null; }
        getAll(k) { return this.list.filter(([key]) => key === String(k)).map(([, v]) => v); }
        has(k) { return this.list.some(([key]) => key === String(k)); }
        set(k, v) {
            const idx = this.list.findIndex(([key]) => key === String(k));
            if (idx < 0) { this.append(k, v); return; }
            this.list[idx] = [String(k), String(v)];
            this.list = this.list.filter(([key], i) => key !== String(k) || i === idx);
        }
        sort() { this.list.sort((a, b) => (a[0] < b[0] ? -1 : a[0] > b[0] ? 1 : 0)); }
        forEach(fn, thisArg) { this.list.forEach(([k, v]) => fn.call(thisArg, v, k, this)); }
        keys() { return this.list.map(([k]) => k)[Symbol.iterator](); }
        values() { return this.list.map(([, v]) => v)[Symbol.iterator](); }
        entries() { return this.list.map(([k, v]) => [k, v])[Symbol.iterator](); }
        [Symbol.iterator]() { return this.entries(); }
        get size() { return this.list.length; }
        toString() { return this.list.map(([k, v]) => encode(k) + '=' + encode(v)).join('&'); }
    }
    globalThis.URLSearchParams = URLSearchParams;

    class URL {
        constructor(url, base) {
            const parsed = JSON.parse(ops.op_parse_url(String(url), base === undefined ? '' : String(base)));
            if (!parsed.ok) throw new TypeError(parsed.error);
            this.parsed = parsed;
            this.protocol = parsed.protocol;
            this.username = parsed.username;
            this.password = parsed.password;
            this.host = parsed.host;
            this.hostname = parsed.hostname;
            this.port = parsed.port;
            this.pathname = parsed.pathname;
            this.hash = parsed.hash;
            this.origin = parsed.origin;
            this.searchParams = new URLSearchParams(parsed.search);
        }
        get search() {
            const query = this.searchParams.toString();
            return query ? '?' + query : '';
        }
        set search(value) { this.searchParams = new URLSearchParams(value); }
        get href() {
            if (!this.host) return this.parsed.href;
            const auth = this.username ? this.username + (this.password ? ':' + this.password : '') + '@' : '';
            return this.protocol + '//' + auth + this.host + this.pathname + this.search + this.hash;
        }
        toString() { return this.href; }
        toJSON() { return this.href; }
    }
    globalThis.URL = URL;

    // ---- DOM query shim --------------------------------------------------
    const toHandles = (input) => {
        if (input === undefined || input === null) return [];
        if (input instanceof Selection) return input.handles.slice();
        if (Array.isArray(input)) return input.flatMap(toHandles);
        if (typeof input === 'string') return [input];
        if (typeof input.__handle === 'string') return [input.__handle];
        return [];
    };
    const unique = (handles) => Array.from(new Set(handles.filter(Boolean)));
    const listResult = (values) => {
        values.get = (i) => (i === undefined ? values : values[i]);
        values.toArray = () => values;
        return values;
    };

    class Selection {
        constructor(handles, root) {
            this.handles = handles;
            this.root = root;
            this.length = handles.length;
            for (let i = 0; i < handles.length; i++) this[i] = { __handle: handles[i] };
        }
        wrap(handles) { return new Selection(handles, this.root); }
        find(selector) { return this.wrap(ops.op_dom_find(this.handles, String(selector))); }
        first() { return this.wrap(this.handles.slice(0, 1)); }
        last() { return this.wrap(this.handles.slice(-1)); }
        eq(i) {
            const handle = this.handles[i < 0 ? this.handles.length + i : i];
            return this.wrap(handle ? [handle] : []);
        }
        get(i) { return i === undefined ? this.toArray() : this[i < 0 ? this.length + i : i]; }
        toArray() { return this.handles.map((h) => ({ __handle: h })); }
        each(fn) {
            for (let i = 0; i < this.handles.length; i++) {
                if (fn.call(this[i], i, this[i]) === false) break;
            }
            return this;
        }
        map(fn) {
            const out = [];
            for (let i = 0; i < this.handles.length; i++) {
                const value = fn.call(this[i], i, this[i]);
                if (value === undefined || value === null) continue;
                if (Array.isArray(value)) out.push(...value); else out.push(value);
            }
            return listResult(out);
        }
        filter(predicate) {
            if (typeof predicate === 'function') {
                return this.wrap(this.handles.filter((h, i) => predicate.call({ __handle: h }, i, { __handle: h })));
            }
            const matching = new Set(ops.op_dom_select(this.root, String(predicate)));
            return this.wrap(this.handles.filter((h) => matching.has(h)));
        }
        is(selector) { return this.filter(selector).length > 0; }
        text() { return ops.op_dom_text(this.handles); }
        html() { return this.handles.length ? ops.op_dom_html(this.handles) : null; }
        attr(name) {
            if (!this.handles.length) return undefined;
            const value = ops.op_dom_attr(this.handles[0], String(name));
            return value === UNDEFINED ? undefined : value;
        }
        val() { return this.attr('value'); }
        data(name) { return this.attr('data-' + name); }
        hasClass(name) { return (this.attr('class') || '').split(/\s+/).includes(name); }
        next() { return this.wrap(unique(this.handles.map((h) => ops.op_dom_next(h)))); }
        prev() { return this.wrap(unique(this.handles.map((h) => ops.op_dom_prev(h)))); }
        parent() { return this.wrap(unique(this.handles.map((h) => ops.op_dom_parent(h)))); }
        children(selector) {
            const kids = this.wrap(unique(this.handles.flatMap((h) => ops.op_dom_children(h))));
            return selector === undefined ? kids : kids.filter(selector);
        }
    }

    const load = (html) => {
        const root = ops.op_dom_load(String(html === undefined || html === null ? '' : html));
        const $ = (input, context) => {
            if (input instanceof Selection) return input;
            if (typeof input === 'string') {
                if (context === undefined) return new Selection(ops.op_dom_select(root, input), root);
                const scope = typeof context === 'string' ? ops.op_dom_select(root, context) : toHandles(context);
                return new Selection(ops.op_dom_find(scope, input), root);
            }
            return new Selection(toHandles(input), root);
        };
        $.html = (selection) => selection === undefined
            ? ops.op_dom_html([root])
            : ops.op_dom_outer_html(toHandles(selection));
        $.text = (selection) => ops.op_dom_text(selection === undefined ? [root] : toHandles(selection));
        $.root = () => new Selection([root], root);
        return $;
    };
    const cheerio = { load: load };
    globalThis.cheerio = cheerio;

    // ---- require ---------------------------------------------------------
    const modules = {
        'cheerio': () => cheerio,
        'cheerio-without-node-native': () => cheerio,
        'react-native-cheerio': () => cheerio,
        'crypto-js': () => globalThis.CryptoJS,
    };
    globalThis.require = (name) => {
        const resolve = modules[String(name)];
        if (!resolve) throw new Error("Cannot find module '" + name + "'");
        return resolve();
    };

    // ---- invoker ---------------------------------------------------------
    globalThis.__scraperModule = { exports: {} };
    globalThis.__runScraper = async function (mediaId, mediaType, season, episode) {
        try {
            const mod = globalThis.__scraperModule;
            const entry = (mod.exports && mod.exports.getStreams)
                || (mod.exportsAlias && mod.exportsAlias.getStreams)
                || globalThis.getStreams;
            if (typeof entry !== 'function') {
                ops.op_capture_result('missing', '');
                return;
            }
            const result = await entry(mediaId, mediaType, season, episode);
            const payload = JSON.stringify(result === undefined || result === null ? [] : result);
            ops.op_capture_result('resolved', payload === undefined ? '[]' : payload);
        } catch (e) {
            ops.op_capture_result('rejected', stringify(e));
        }
    };
})();
"#;

/// Wrap untrusted source in a CommonJS-style function scope.
///
/// Top-level declarations stay local to the wrapper, so a script may shadow
/// `fetch` or `URL` without clobbering the prelude. A bare top-level
/// `getStreams` function is exported explicitly.
pub fn wrap_module(source: &str) -> String {
    format!(
        "(function (module, exports, require) {{\n{}\n;\nif (typeof getStreams === 'function' && !(module.exports && module.exports.getStreams)) {{ module.exports.getStreams = getStreams; }}\nglobalThis.__scraperModule.exportsAlias = exports;\n}}).call(globalThis, globalThis.__scraperModule, globalThis.__scraperModule.exports, globalThis.require);",
        source
    )
}

/// Script that exposes the scraper's identity and user settings
pub fn settings_script(scraper_id: &str, settings: &serde_json::Value) -> String {
    let id = serde_json::to_string(scraper_id).unwrap_or_else(|_| "\"\"".to_string());
    let settings = serde_json::to_string(settings).unwrap_or_else(|_| "{}".to_string());
    format!(
        "globalThis.SCRAPER_ID = {};\nglobalThis.SCRAPER_SETTINGS = Object.freeze({});",
        id, settings
    )
}

/// Script calling the entry point with media arguments
pub fn invoke_script(media_id: &str, media_type: &str, season: Option<u32>, episode: Option<u32>) -> String {
    let number = |n: Option<u32>| n.map(|v| v.to_string()).unwrap_or_else(|| "undefined".to_string());
    format!(
        "globalThis.__runScraper({}, {}, {}, {});",
        serde_json::to_string(media_id).unwrap_or_else(|_| "\"\"".to_string()),
        serde_json::to_string(media_type).unwrap_or_else(|_| "\"\"".to_string()),
        number(season),
        number(episode),
    )
}

/// Create a JavaScript runtime with the bridge ops and prelude installed
///
/// The returned runtime has no [`BridgeState`] yet; the caller puts one into
/// its op state before running scraper code.
pub fn create_js_runtime_with_bindings(limits: &ResourceLimits) -> Result<JsRuntime> {
    let ext = Extension {
        name: "scraper_bridge",
        ops: Cow::Borrowed(&[
            op_fetch::DECL,
            op_sleep::DECL,
            op_parse_url::DECL,
            op_dom_load::DECL,
            op_dom_select::DECL,
            op_dom_find::DECL,
            op_dom_text::DECL,
            op_dom_html::DECL,
            op_dom_outer_html::DECL,
            op_dom_attr::DECL,
            op_dom_next::DECL,
            op_dom_prev::DECL,
            op_dom_parent::DECL,
            op_dom_children::DECL,
            op_crypto_convert::DECL,
            op_crypto_digest::DECL,
            op_console::DECL,
            op_capture_result::DECL,
        ]),
        ..Default::default()
    };

    let mut runtime = JsRuntime::new(RuntimeOptions {
        extensions: vec![ext],
        create_params: Some(v8::CreateParams::default().heap_limits(0, limits.max_heap_bytes)),
        ..Default::default()
    });

    // Terminate instead of aborting the process when a script exhausts the heap
    let isolate = runtime.v8_isolate().thread_safe_handle();
    runtime.add_near_heap_limit_callback(move |current, _initial| {
        isolate.terminate_execution();
        current * 2
    });

    runtime
        .execute_script("<scraper_prelude>", PRELUDE.to_string().into())
        .context("Failed to initialize JavaScript bindings")?;

    Ok(runtime)
}
