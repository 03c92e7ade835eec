//! Observer page served at `/`

pub const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>RaspiCam</title>
  <style>
    body { font-family: sans-serif; margin: 2em; }
    img { max-width: 100%; border: 1px solid #ccc; }
    #status { color: #666; }
  </style>
</head>
<body>
  <h1>RaspiCam</h1>
  <p id="status">connecting...</p>
  <img id="latest" alt="waiting for the next capture">
  <script>
    (function () {
      var proto = location.protocol === 'https:' ? 'wss://' : 'ws://';
      var status = document.getElementById('status');
      var latest = document.getElementById('latest');

      function connect() {
        var socket = new WebSocket(proto + location.host + '/ws');
        socket.onmessage = function (ev) {
          var msg = JSON.parse(ev.data);
          if (msg.type === 'connected') {
            console.log(msg.data);
            status.textContent = 'connected';
          } else if (msg.type === 'sendData') {
            latest.src = '/images/' + encodeURIComponent(msg.data);
            status.textContent = 'last capture: ' + msg.data;
          }
        };
        socket.onclose = function () {
          status.textContent = 'disconnected, retrying...';
          setTimeout(connect, 3000);
        };
      }

      connect();
    })();
  </script>
</body>
</html>
"#;
