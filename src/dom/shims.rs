//! JS source texts installed into every harness context.
//!
//! Shims are plain JS strings, not native Rust bindings, for the same
//! reason the replay patch library (`spec.md` §4.8) is: a JS string is
//! trivial to keep idempotent, easy to read next to the spec it
//! implements, and doesn't need a `boa_engine::class::Class` impl per
//! DOM surface. The only native surface is the four `__pp_*` bridge
//! functions registered by [`super::install_bridge`] before this runs —
//! everything else (matchMedia, observers, canvas, fetch, XHR,
//! `document.createElement`) is expressed here in terms of those four.

/// Installed once per harness, before any page script runs.
pub const SHIM_JS: &str = r#"
(function () {
  "use strict";

  globalThis.console = {
    log: function () { __pp_console.apply(null, arguments); },
    warn: function () { __pp_console.apply(null, arguments); },
    error: function () { __pp_console.apply(null, arguments); },
    info: function () { __pp_console.apply(null, arguments); },
    debug: function () { __pp_console.apply(null, arguments); },
  };

  globalThis.__pp_timers = [];
  globalThis.setTimeout = function (fn) {
    __pp_timers.push(fn);
    return __pp_timers.length;
  };
  globalThis.setInterval = globalThis.setTimeout;
  globalThis.clearTimeout = function (id) {
    if (id > 0) __pp_timers[id - 1] = null;
  };
  globalThis.clearInterval = globalThis.clearTimeout;
  globalThis.queueMicrotask = function (fn) {
    Promise.resolve().then(fn);
  };
  globalThis.requestAnimationFrame = function (fn) {
    return __pp_timers.push(fn);
  };
  globalThis.cancelAnimationFrame = globalThis.clearTimeout;

  globalThis.matchMedia = function (query) {
    return {
      matches: false,
      media: String(query),
      onchange: null,
      addListener: function () {},
      removeListener: function () {},
      addEventListener: function () {},
      removeEventListener: function () {},
      dispatchEvent: function () { return true; },
    };
  };

  function StubObserver(callback) {
    this._callback = callback;
  }
  StubObserver.prototype.observe = function () {};
  StubObserver.prototype.unobserve = function () {};
  StubObserver.prototype.disconnect = function () {};
  StubObserver.prototype.takeRecords = function () { return []; };
  globalThis.ResizeObserver = StubObserver;
  globalThis.IntersectionObserver = StubObserver;
  globalThis.MutationObserver = StubObserver;

  function FakeAnimation() {
    this.onfinish = null;
    this.currentTime = 0;
    this.playState = "finished";
  }
  FakeAnimation.prototype.play = function () {};
  FakeAnimation.prototype.pause = function () {};
  FakeAnimation.prototype.cancel = function () {};
  FakeAnimation.prototype.reverse = function () {};
  FakeAnimation.prototype.finish = function () {
    if (this.onfinish) {
      try { this.onfinish(); } catch (e) {}
    }
  };

  globalThis.CSS = {
    px: function (v) { return String(v) + "px"; },
    number: function (v) { return Number(v); },
    escape: function (v) { return String(v); },
    supports: function () { return false; },
  };

  function stubCanvasContext() {
    const calls = {};
    return new Proxy(
      {},
      {
        get: function (target, prop) {
          if (prop === "canvas") return undefined;
          if (!(prop in calls)) calls[prop] = function () {};
          return calls[prop];
        },
      }
    );
  }

  const LINK_REL_ALLOW = [
    "stylesheet",
    "preload",
    "icon",
    "prefetch",
    "modulepreload",
  ];

  function reportLinkIfReady(el) {
    if (el.__reported) return;
    const rel = (el._attrs.rel || "").toLowerCase().split(/\s+/);
    let allowed = false;
    for (let i = 0; i < rel.length; i++) {
      if (LINK_REL_ALLOW.indexOf(rel[i]) !== -1) { allowed = true; break; }
    }
    if (el._attrs.href && allowed) {
      __pp_intercept(el._attrs.href, "resource");
      el.__reported = true;
    }
  }

  function applyStyleText(el, text) {
    __pp_intercept_css(String(text));
    el._attrs.style = String(text);
  }

  function makeStyleDeclaration() {
    const state = { _text: "" };
    return new Proxy(state, {
      get: function (target, prop) {
        if (prop === "cssText") return target._text;
        if (prop === "setProperty") {
          return function (name, value) {
            target._text += String(name) + ": " + String(value) + "; ";
            __pp_intercept_css(String(name) + ": " + String(value) + ";");
          };
        }
        if (prop === "removeProperty") return function () { return ""; };
        return target[prop];
      },
      set: function (target, prop, value) {
        if (prop === "cssText") {
          target._text = String(value);
          __pp_intercept_css(String(value));
          return true;
        }
        __pp_intercept_css(String(prop) + ": " + String(value) + ";");
        target[prop] = value;
        return true;
      },
    });
  }

  globalThis.__pp_all_elements = globalThis.__pp_all_elements || [];

  function makeElement(tag) {
    tag = String(tag).toLowerCase();
    const el = {
      tagName: tag.toUpperCase(),
      _attrs: {},
      childNodes: [],
      children: [],
    };
    el.style = makeStyleDeclaration();
    globalThis.__pp_all_elements.push(el);

    el.setAttribute = function (name, value) {
      name = String(name).toLowerCase();
      value = String(value);
      el._attrs[name] = value;
      if (tag === "link") {
        if (name === "href" || name === "rel") {
          reportLinkIfReady(el);
        } else if (name === "imagesrcset") {
          __pp_intercept_srcset(value, "img");
        }
        return;
      }
      if (name === "srcset") {
        __pp_intercept_srcset(value, "img");
        return;
      }
      if (name === "style") {
        applyStyleText(el, value);
        return;
      }
      if (name === "src") {
        __pp_intercept(value, tag === "img" ? "img" : "resource");
        return;
      }
      if (name === "poster" && tag === "video") {
        __pp_intercept(value, "resource");
        return;
      }
      if (name === "data" && tag === "object") {
        __pp_intercept(value, "resource");
      }
    };
    el.getAttribute = function (name) {
      name = String(name).toLowerCase();
      return Object.prototype.hasOwnProperty.call(el._attrs, name)
        ? el._attrs[name]
        : null;
    };
    el.removeAttribute = function (name) {
      delete el._attrs[String(name).toLowerCase()];
    };
    el.hasAttribute = function (name) {
      return Object.prototype.hasOwnProperty.call(
        el._attrs,
        String(name).toLowerCase()
      );
    };
    el.appendChild = function (child) {
      el.children.push(child);
      el.childNodes.push(child);
      return child;
    };
    el.insertBefore = function (child) {
      el.children.push(child);
      return child;
    };
    el.removeChild = function (child) { return child; };
    el.remove = function () {};
    el.cloneNode = function () { return makeElement(tag); };
    el.addEventListener = function (type, fn) {
      el["on" + type] = fn;
    };
    el.removeEventListener = function () {};
    el.dispatchEvent = function () { return true; };
    el.animate = function () { return new FakeAnimation(); };
    el.getContext = function () { return stubCanvasContext(); };
    el.focus = function () {};
    el.click = function () {};

    const urlProps = [
      "src",
      "href",
      "rel",
      "poster",
      "data",
      "srcset",
      "imagesrcset",
    ];
    for (let i = 0; i < urlProps.length; i++) {
      const prop = urlProps[i];
      Object.defineProperty(el, prop, {
        configurable: true,
        get: function () { return el._attrs[prop] || ""; },
        set: function (v) { el.setAttribute(prop, v); },
      });
    }
    Object.defineProperty(el, "innerHTML", {
      configurable: true,
      get: function () { return el._attrs.__innerHTML || ""; },
      set: function (v) {
        el._attrs.__innerHTML = String(v);
        if (tag === "style") __pp_intercept_css(String(v));
      },
    });
    Object.defineProperty(el, "textContent", {
      configurable: true,
      get: function () { return el._attrs.__text || ""; },
      set: function (v) {
        el._attrs.__text = String(v);
        if (tag === "style") __pp_intercept_css(String(v));
      },
    });
    return el;
  }

  const doc = globalThis.document || {};
  doc.__listeners = {};
  doc.addEventListener = function (type, fn) {
    (doc.__listeners[type] = doc.__listeners[type] || []).push(fn);
  };
  doc.removeEventListener = function () {};
  doc.dispatchEvent = function () { return true; };
  doc.querySelector = function () { return null; };
  doc.querySelectorAll = function () { return []; };
  doc.getElementById = function () { return null; };
  doc.getElementsByTagName = function () { return []; };
  doc.getElementsByClassName = function () { return []; };
  doc.createTextNode = function (text) { return { nodeValue: String(text) }; };
  doc.createElement = function (tag) { return makeElement(tag); };
  doc.createElementNS = function (_ns, tag) { return makeElement(tag); };
  doc.body = makeElement("body");
  doc.head = makeElement("head");
  doc.documentElement = makeElement("html");
  doc.title = "";
  globalThis.document = doc;

  globalThis.window = globalThis;
  globalThis.navigator = globalThis.navigator || {
    userAgent: "Lighterceptor/1.0",
    sendBeacon: function () { return true; },
  };
  globalThis.location = globalThis.location || {
    href: "",
    hostname: "",
    protocol: "https:",
  };

  globalThis.__windowListeners = {};
  globalThis.addEventListener = function (type, fn) {
    (globalThis.__windowListeners[type] =
      globalThis.__windowListeners[type] || []).push(fn);
  };
  globalThis.removeEventListener = function () {};
  globalThis.dispatchEvent = function () { return true; };

  function fakeResponse(url) {
    const isManifest = /manifest(\.[\w-]+)?\.json($|\?)/i.test(String(url));
    return {
      ok: true,
      status: 200,
      statusText: "OK",
      url: String(url),
      headers: {
        get: function () { return null; },
        has: function () { return false; },
        forEach: function () {},
      },
      json: function () {
        return Promise.resolve(isManifest ? {} : {});
      },
      text: function () {
        return Promise.resolve(isManifest ? "{}" : "");
      },
      arrayBuffer: function () {
        return Promise.resolve(new ArrayBuffer(0));
      },
      clone: function () { return fakeResponse(url); },
    };
  }

  globalThis.fetch = function (input, _init) {
    const url =
      typeof input === "string"
        ? input
        : (input && input.url) || String(input);
    __pp_intercept(url, "fetch");
    return Promise.resolve(fakeResponse(url));
  };

  function XHRShim() {
    this.readyState = 0;
    this.status = 0;
    this.statusText = "";
    this.responseText = "";
    this.response = "";
    this.onreadystatechange = null;
    this.onload = null;
    this.onerror = null;
  }
  XHRShim.prototype.open = function (method, url) {
    this._method = method;
    this._url = url;
    this.readyState = 1;
  };
  XHRShim.prototype.setRequestHeader = function () {};
  XHRShim.prototype.getAllResponseHeaders = function () { return ""; };
  XHRShim.prototype.getResponseHeader = function () { return null; };
  XHRShim.prototype.abort = function () {};
  XHRShim.prototype.addEventListener = function (type, fn) {
    this["on" + type] = fn;
  };
  XHRShim.prototype.send = function () {
    __pp_intercept(this._url, "xhr");
    this.readyState = 4;
    this.status = 200;
    this.statusText = "OK";
    this.responseText = "";
    this.response = "";
    try { if (this.onreadystatechange) this.onreadystatechange(); } catch (e) {}
    try { if (this.onload) this.onload(); } catch (e) {}
  };
  globalThis.XMLHttpRequest = XHRShim;
})();
"#;

/// Run once after every page script has been evaluated: drains the
/// timer queue, fires `load`/`DOMContentLoaded` listeners, and then
/// hovers every element in the document once so code paths gated on
/// `mouseover` (lazy images, hover-revealed menus, …) still trigger —
/// each wrapped so a throwing handler can't hide the ones after it.
pub const SETTLE_JS: &str = r#"
(function () {
  "use strict";
  const timers = globalThis.__pp_timers || [];
  for (let i = 0; i < timers.length; i++) {
    const fn = timers[i];
    if (typeof fn === "function") {
      try { fn(); } catch (e) {}
    }
  }
  globalThis.__pp_timers = [];

  const doc = globalThis.document;
  if (doc && doc.__listeners) {
    const handlers = doc.__listeners["DOMContentLoaded"] || [];
    for (let i = 0; i < handlers.length; i++) {
      try { handlers[i]({ type: "DOMContentLoaded" }); } catch (e) {}
    }
  }
  const winListeners = globalThis.__windowListeners || {};
  const loadHandlers = winListeners["load"] || [];
  for (let i = 0; i < loadHandlers.length; i++) {
    try { loadHandlers[i]({ type: "load" }); } catch (e) {}
  }

  const elements = globalThis.__pp_all_elements || [];
  for (let i = 0; i < elements.length; i++) {
    const el = elements[i];
    if (typeof el.onmouseover === "function") {
      try { el.onmouseover({ type: "mouseover", target: el }); } catch (e) {}
    }
  }
})();
"#;
