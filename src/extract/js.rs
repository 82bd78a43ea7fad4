//! DOM-side programs used by the extraction strategies.
//!
//! Every script the engine evaluates lives here as a named constant so fake
//! automation providers can dispatch on program identity instead of parsing
//! JavaScript.

/// Full visible page text, used by the protection classifier.
pub const BODY_TEXT: &str = "document.body ? document.body.innerText : ''";

/// Serialized document, used by the embedded-data strategy.
pub const PAGE_HTML: &str = "document.documentElement.outerHTML";

/// Collect `{url, title}` pairs for script detail links on a listing page,
/// excluding comment-form fragments and stripping query/hash noise.
pub const LISTING_LINKS: &str = r#"(() => {
    const found = [];
    document.querySelectorAll('a').forEach(link => {
        const href = link.href;
        if (href && href.includes('/script/')
            && /\/script\/[A-Za-z0-9]+/.test(href)
            && !href.endsWith('#chart-view-comment-form')) {
            const clean = href.split('?')[0].split('#')[0];
            const title = (link.textContent || '').trim();
            if (!found.some(s => s.url === clean)) {
                found.push({
                    url: clean,
                    title: title.length > 3 ? title.substring(0, 200) : 'Unknown',
                });
            }
        }
    });
    return found;
})()"#;

/// Bounding box of the code container, located by content-signature tokens.
/// Returns `{x, y, width, height}` or `null`.
pub const CODE_CONTAINER_BOX: &str = r#"(() => {
    const nodes = Array.from(document.querySelectorAll('div, section, pre'));
    for (const n of nodes) {
        const t = n.textContent || '';
        if (t.includes('//@version') || t.includes('indicator(')
            || t.includes('library(') || t.includes('plot(')) {
            const r = n.getBoundingClientRect();
            return {x: r.x, y: r.y, width: r.width, height: r.height};
        }
    }
    return null;
})()"#;

/// Center of a copy control inside the code container, skipping promotional
/// buttons. Returns `{x, y, width, height}` or `null`.
pub const INNER_COPY_CONTROL_BOX: &str = r#"(() => {
    const nodes = Array.from(document.querySelectorAll('div, section, pre'));
    let box = null;
    for (const n of nodes) {
        const t = n.textContent || '';
        if (t.includes('//@version') || t.includes('indicator(')
            || t.includes('library(') || t.includes('plot(')) {
            box = n.getBoundingClientRect();
            break;
        }
    }
    if (!box) return null;
    const blacklist = ['free', 'trial', 'upgrade', 'subscribe', 'login', 'signup', 'buy'];
    const candidates = Array.from(document.querySelectorAll(
        'button, [role=button], .copy-to-clipboard, [class*=copy]'));
    for (const c of candidates) {
        const r = c.getBoundingClientRect();
        if (r.width <= 6 || r.height <= 6) continue;
        const inside = r.x >= box.x - 2 && (r.x + r.width) <= (box.x + box.width + 2)
            && r.y >= box.y - 2 && (r.y + r.height) <= (box.y + box.height + 2);
        const nearTopRight = r.x >= (box.x + box.width - 120) && r.y <= (box.y + 80);
        if (!inside && !nearTopRight) continue;
        const label = ((c.getAttribute('aria-label') || '') + ' '
            + (c.getAttribute('title') || '') + ' ' + (c.textContent || '')).toLowerCase();
        if (blacklist.some(b => label.includes(b))) continue;
        const looksLikeCopy = /copy|clipboard/.test(label) || !!c.querySelector('svg');
        if (looksLikeCopy) {
            return {x: r.x, y: r.y, width: r.width, height: r.height};
        }
    }
    return null;
})()"#;

/// Source text held directly in a clipboard data attribute, or ''.
pub const COPY_DATA_ATTRIBUTE: &str = r#"(() => {
    const attrs = ['data-clipboard-text', 'data-clipboard', 'data-copy'];
    for (const a of attrs) {
        const el = document.querySelector('[' + a + ']');
        if (el) {
            const v = el.getAttribute(a);
            if (v) return v;
        }
    }
    return '';
})()"#;

/// Reset both the in-page capture hook and the OS clipboard so a stale
/// payload cannot satisfy the next read.
pub const CLEAR_CLIPBOARD: &str = r#"(async () => {
    window.__copied__ = '';
    try {
        if (navigator.clipboard && navigator.clipboard.writeText) {
            await navigator.clipboard.writeText('');
        }
    } catch(e){}
    return true;
})()"#;

/// Activate the source tab if one exists. Returns whether a tab was clicked.
pub const CLICK_SOURCE_TAB: &str = r#"(() => {
    const candidates = Array.from(document.querySelectorAll('[role=tab], button, a'));
    for (const c of candidates) {
        const t = (c.textContent || '').trim().toLowerCase();
        if (t === 'source code' || t === 'source' || t === 'show source') {
            c.dispatchEvent(new MouseEvent('click', {bubbles: true, cancelable: true}));
            return true;
        }
    }
    return false;
})()"#;

/// Visible source lines from the opened source tab: a container whose many
/// line-like children carry the code, else a pre/code fallback. Returns the
/// raw joined lines (line-number tokens included) or ''.
pub const SOURCE_TAB_LINES: &str = r#"(() => {
    for (const container of document.querySelectorAll('div')) {
        const children = Array.from(container.children);
        if (children.length >= 12) {
            const texts = children.map(c => (c.textContent || '').trim());
            const joined = texts.join('\n');
            if ((joined.includes('//@version') || joined.includes('indicator(')
                || joined.includes('strategy(') || joined.includes('library(')
                || joined.includes('plot(')) && joined.length > 100) {
                return joined;
            }
        }
    }
    for (const elem of document.querySelectorAll('pre code, pre')) {
        const text = elem.textContent || '';
        if (text.includes('//@version') && text.length > 200) {
            return text;
        }
    }
    return '';
})()"#;

/// Page title (first h1).
pub const TITLE: &str = r#"(() => {
    const h1 = document.querySelector('h1');
    return h1 ? h1.textContent.trim() : '';
})()"#;

/// Author handle from the profile link.
pub const AUTHOR: &str = r#"(() => {
    const a = document.querySelector('a[href^="/u/"]');
    return a ? a.textContent.trim().replace('by ', '') : '';
})()"#;

/// Publication text, description, tags, and like count in one round trip.
pub const EXTENDED_META: &str = r#"(() => {
    const meta = {published: '', description: '', tags: [], likes: 0};
    const relTime = document.querySelector('relative-time');
    if (relTime) {
        for (const attr of ['event-time', 'ssr-time', 'datetime', 'title']) {
            const v = relTime.getAttribute(attr);
            if (v) { meta.published = v; break; }
        }
        if (!meta.published) meta.published = (relTime.textContent || '').trim();
    }
    if (!meta.published) {
        const timeEl = document.querySelector('time');
        if (timeEl) {
            meta.published = timeEl.getAttribute('datetime') || timeEl.textContent.trim();
        }
    }
    const descDiv = document.querySelector('div[class*=description]');
    if (descDiv) {
        meta.description = descDiv.innerText.trim();
    } else {
        const md = document.querySelector('meta[name=description]');
        if (md) meta.description = md.getAttribute('content') || '';
    }
    const tagSection = document.querySelector('section[class*=tags]');
    if (tagSection) {
        tagSection.querySelectorAll('a[href*="/scripts/"]').forEach(a => {
            const t = a.textContent.trim();
            if (t && !meta.tags.includes(t)) meta.tags.push(t);
        });
    }
    const likeSpan = document.querySelector('span[aria-label*=boosts]');
    if (likeSpan) {
        const m = (likeSpan.getAttribute('aria-label') || '').match(/(\d+)/);
        if (m) meta.likes = parseInt(m[1], 10);
    }
    return meta;
})()"#;
