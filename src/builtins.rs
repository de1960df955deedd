//! Capabilities shipped with the default module registry.
//!
//! Each entry is a sandbox-language expression that evaluates to the module
//! object. They are evaluated lazily, on the first `require` of their name.

/// Element factory. Function components are invoked eagerly, so a tree only
/// ever contains plain `{type, props, children}` objects.
pub(crate) const REACT: &str = r#"(function () {
  var Fragment = "Fragment";
  function flatten(children, out) {
    for (var i = 0; i < children.length; i++) {
      var c = children[i];
      if (Array.isArray(c)) {
        flatten(c, out);
      } else if (c !== null && c !== undefined && c !== false && c !== true) {
        out.push(c);
      }
    }
    return out;
  }
  function createElement(type, props) {
    var children = flatten(Array.prototype.slice.call(arguments, 2), []);
    var p = Object.assign({}, props || {});
    if (typeof type === "function") {
      if (children.length > 0) {
        p.children = children;
      }
      var rendered = type(p);
      return rendered === undefined ? null : rendered;
    }
    var own = {};
    for (var k in p) {
      if (Object.prototype.hasOwnProperty.call(p, k) && typeof p[k] !== "function") {
        own[k] = p[k];
      }
    }
    var el = { type: String(type), props: own };
    if (children.length > 0) {
      el.children = children;
    }
    return el;
  }
  return Object.freeze({ createElement: createElement, Fragment: Fragment });
})()"#;

pub(crate) const CLASSNAMES: &str = r#"(function () {
  function classNames() {
    var out = [];
    for (var i = 0; i < arguments.length; i++) {
      var a = arguments[i];
      if (!a) {
        continue;
      }
      if (typeof a === "string" || typeof a === "number") {
        out.push(String(a));
      } else if (Array.isArray(a)) {
        var inner = classNames.apply(null, a);
        if (inner) {
          out.push(inner);
        }
      } else if (typeof a === "object") {
        for (var k in a) {
          if (Object.prototype.hasOwnProperty.call(a, k) && a[k]) {
            out.push(k);
          }
        }
      }
    }
    return out.join(" ");
  }
  return classNames;
})()"#;

/// `get`, `pick`, `omit` and `isEqual`.
pub(crate) const LODASH: &str = r#"(function () {
  var has = Object.prototype.hasOwnProperty;
  function toPath(path) {
    if (Array.isArray(path)) {
      return path;
    }
    return String(path)
      .replace(/\[(\w+)\]/g, ".$1")
      .split(".")
      .filter(function (s) { return s.length > 0; });
  }
  function get(obj, path, dflt) {
    var parts = toPath(path);
    var cur = obj;
    for (var i = 0; i < parts.length; i++) {
      if (cur === null || cur === undefined) {
        return dflt;
      }
      cur = cur[parts[i]];
    }
    return cur === undefined ? dflt : cur;
  }
  function keyList(keys) {
    return Array.isArray(keys) ? keys : [keys];
  }
  function pick(obj, keys) {
    var out = {};
    keyList(keys).forEach(function (k) {
      if (obj && has.call(obj, k)) {
        out[k] = obj[k];
      }
    });
    return out;
  }
  function omit(obj, keys) {
    var drop = keyList(keys);
    var out = {};
    for (var k in obj) {
      if (has.call(obj, k) && drop.indexOf(k) < 0) {
        out[k] = obj[k];
      }
    }
    return out;
  }
  function isEqual(a, b) {
    if (a === b) {
      return true;
    }
    if (a === null || b === null || typeof a !== "object" || typeof b !== "object") {
      return a !== a && b !== b;
    }
    if (Array.isArray(a) !== Array.isArray(b)) {
      return false;
    }
    var ka = Object.keys(a);
    var kb = Object.keys(b);
    if (ka.length !== kb.length) {
      return false;
    }
    for (var i = 0; i < ka.length; i++) {
      if (!has.call(b, ka[i]) || !isEqual(a[ka[i]], b[ka[i]])) {
        return false;
      }
    }
    return true;
  }
  return Object.freeze({ get: get, pick: pick, omit: omit, isEqual: isEqual });
})()"#;
