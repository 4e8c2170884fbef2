//! The single HTML page served at `/`.
//!
//! Upload control, image preview, text area and banner. The page posts the
//! file to `/upload` and renders the returned `PipelineReport`.

pub const INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Handwritten Text Detection</title>
<style>
  body { font-family: system-ui, sans-serif; max-width: 46rem; margin: 2rem auto; padding: 0 1rem; color: #222; }
  #preview { max-width: 100%; margin-top: 1rem; display: none; }
  #busy { display: none; margin-top: 1rem; font-style: italic; }
  #result { display: none; margin-top: 1.5rem; }
  #text { white-space: pre-wrap; background: #f6f6f6; padding: 1rem; border-radius: 6px; }
  .banner { margin-top: 1rem; padding: .75rem 1rem; border-radius: 6px; display: none; }
  .banner.success { display: block; background: #e6f4ea; color: #1e4620; }
  .banner.error { display: block; background: #fdecea; color: #611a15; }
</style>
</head>
<body>
<h1>Handwritten Text Detection</h1>
<p>Step forth, brave soul! Present your image to the mystical screen, and I shall summon the hidden words within!</p>

<input id="file" type="file" accept="image/*">
<img id="preview" alt="Uploaded Image">
<p id="busy">Processing the image...</p>

<section id="result">
  <h3>Behold! The text has been conjured from the image by the sheer force of magic!</h3>
  <div id="text"></div>
</section>
<div id="banner" class="banner"></div>

<script>
const fileInput = document.getElementById("file");
const preview = document.getElementById("preview");
const busy = document.getElementById("busy");
const result = document.getElementById("result");
const text = document.getElementById("text");
const banner = document.getElementById("banner");

function showBanner(level, message, url) {
  banner.className = "banner " + level;
  banner.textContent = message;
  if (url) {
    const link = document.createElement("a");
    link.href = url;
    link.textContent = " Open in Notion";
    link.target = "_blank";
    banner.appendChild(link);
  }
}

fileInput.addEventListener("change", async () => {
  const file = fileInput.files[0];
  result.style.display = "none";
  banner.className = "banner";
  if (!file) return;

  preview.src = URL.createObjectURL(file);
  preview.style.display = "block";

  const form = new FormData();
  form.append("file", file);

  busy.style.display = "block";
  fileInput.disabled = true;
  try {
    const resp = await fetch("/upload", { method: "POST", body: form });
    if (!resp.ok) {
      showBanner("error", await resp.text());
      return;
    }
    const report = await resp.json();
    if (report.text) {
      text.textContent = report.text;
      result.style.display = "block";
    }
    showBanner(report.banner.level, report.banner.message, report.page && report.page.url);
  } catch (err) {
    showBanner("error", "Upload failed: " + err);
  } finally {
    busy.style.display = "none";
    fileInput.disabled = false;
  }
});
</script>
</body>
</html>
"#;
