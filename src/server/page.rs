//! The controller's single HTML page.

pub const INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>twmd</title>
<style>
  body { font-family: system-ui, sans-serif; margin: 2rem auto; max-width: 56rem; color: #222; }
  fieldset { border: 1px solid #ccc; border-radius: 6px; margin-bottom: 1rem; }
  label { display: block; margin: .4rem 0 .1rem; font-size: .85rem; color: #555; }
  input, textarea { width: 100%; box-sizing: border-box; padding: .35rem; }
  button { padding: .45rem 1rem; margin-right: .5rem; cursor: pointer; }
  #log { background: #111; color: #ddd; font-family: monospace; font-size: .8rem;
         padding: .75rem; height: 22rem; overflow-y: auto; white-space: pre-wrap;
         border-radius: 6px; }
  #status { font-weight: bold; }
</style>
</head>
<body>
<h1>twmd</h1>
<p>Status: <span id="status">idle</span></p>

<fieldset>
  <legend>Session</legend>
  <label for="cookies">Cookie text (header, line, or jar form)</label>
  <textarea id="cookies" rows="3"></textarea>
  <p>
    <button onclick="call('/api/login', {cookies: v('cookies')})">Login</button>
    <button onclick="call('/api/whoami')">Who am I</button>
    <button onclick="call('/api/logout')">Logout</button>
  </p>
</fieldset>

<fieldset>
  <legend>Download</legend>
  <label for="users">Handles (comma separated)</label>
  <input id="users" placeholder="alice, bob">
  <label for="outdir">Output directory</label>
  <input id="outdir" placeholder="/path/to/media">
  <p>
    <button onclick="startJob()">Start</button>
    <button onclick="call('/api/stop')">Stop</button>
  </p>
</fieldset>

<div id="log"></div>

<script>
function v(id) { return document.getElementById(id).value; }
function append(line) {
  const log = document.getElementById('log');
  log.textContent += line + '\n';
  log.scrollTop = log.scrollHeight;
}
async function call(path, body) {
  const response = await fetch(path, {
    method: 'POST',
    headers: {'Content-Type': 'application/json'},
    body: JSON.stringify(body || {}),
  });
  const data = await response.json();
  if (data.stdout) append(data.stdout);
  if (data.stderr) append(data.stderr);
  if (data.error) append(data.error);
  refreshStatus();
}
function startJob() {
  const users = v('users').split(',').map(s => s.trim()).filter(Boolean);
  call('/api/download', {users, outputDir: v('outdir')});
}
async function refreshStatus() {
  const data = await (await fetch('/api/status')).json();
  document.getElementById('status').textContent = data.running ? 'running' : 'idle';
}
const source = new EventSource('/events');
source.addEventListener('log', (e) => append(JSON.parse(e.data).line));
source.addEventListener('job', (e) => {
  const data = JSON.parse(e.data);
  append('[job] ' + data.type + (data.message ? ': ' + data.message : ''));
  refreshStatus();
});
refreshStatus();
setInterval(refreshStatus, 5000);
</script>
</body>
</html>
"#;
